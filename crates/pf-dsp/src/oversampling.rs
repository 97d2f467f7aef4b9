//! Oversampling for true-peak limiting
//!
//! Cascaded 2x stages, each a linear-phase Kaiser-windowed half-band FIR:
//! - Only odd taps are non-zero besides the centre, so each stage runs polyphase
//! - Tap counts give every up+down round trip an integer base-rate delay
//! - All histories and scratch buffers are allocated up front for 32x

use pf_core::Sample;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::Processor;

/// Highest supported oversampling factor
pub const MAX_FACTOR: usize = 32;

const STAGE_COUNT: usize = 5;

/// Taps per cascaded stage (2x, 4x, 8x, 16x, 32x)
const STAGE_TAPS: [usize; STAGE_COUNT] = [81, 41, 25, 33, 33];

/// Kaiser design attenuation (dB); leaves >= 100 dB after window estimate error
const DESIGN_ATTENUATION_DB: f64 = 110.0;

// ═══════════════════════════════════════════════════════════════════════════════
// FACTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Oversampling factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OversampleFactor {
    X1,
    X2,
    X4,
    X8,
    X16,
    X32,
}

impl OversampleFactor {
    pub const ALL: [Self; 6] = [Self::X1, Self::X2, Self::X4, Self::X8, Self::X16, Self::X32];

    /// Map a parameter index (0..=5); larger indices saturate at 32x
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn factor(self) -> usize {
        1 << self.index()
    }

    /// Factor from its ratio (1, 2, 4, ... 32)
    pub fn from_ratio(ratio: usize) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.factor() == ratio)
    }

    /// Number of cascaded 2x stages
    #[inline]
    pub fn stages(self) -> usize {
        self.index()
    }

    /// Up+down round-trip delay in base-rate samples
    pub fn filter_delay(self) -> usize {
        (0..self.stages())
            .map(|s| (STAGE_TAPS[s] - 1) >> (s + 1))
            .sum()
    }

    pub fn clamp(self, min: Self, max: Self) -> Self {
        Self::from_index(self.index().clamp(min.index(), max.index()))
    }
}

impl Default for OversampleFactor {
    fn default() -> Self {
        Self::X2
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILTER DESIGN
// ═══════════════════════════════════════════════════════════════════════════════

/// Kaiser-windowed half-band lowpass (cutoff at a quarter of the high rate).
///
/// Even offsets from the centre are forced to zero and the odd taps are
/// normalised to sum to 0.5, so DC gain is exactly one.
fn design_halfband(taps: usize) -> Vec<f64> {
    let beta = 0.1102 * (DESIGN_ATTENUATION_DB - 8.7);
    let center = (taps - 1) / 2;
    let i0_beta = bessel_i0(beta);

    let mut h = vec![0.0; taps];
    for (i, tap) in h.iter_mut().enumerate() {
        let offset = i as isize - center as isize;
        if offset == 0 {
            *tap = 0.5;
            continue;
        }
        if offset % 2 == 0 {
            continue;
        }
        let n = offset as f64;
        let ideal = (PI * n / 2.0).sin() / (PI * n);
        let r = n / center as f64;
        let window = bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / i0_beta;
        *tap = ideal * window;
    }

    let odd_sum: f64 = h
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != center)
        .map(|(_, &v)| v)
        .sum();
    for (i, tap) in h.iter_mut().enumerate() {
        if i != center {
            *tap *= 0.5 / odd_sum;
        }
    }
    h
}

/// Modified Bessel function of the first kind, order 0
fn bessel_i0(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 3.75 {
        let y = (x / 3.75).powi(2);
        1.0 + y
            * (3.5156229
                + y * (3.0899424
                    + y * (1.2067492 + y * (0.2659732 + y * (0.0360768 + y * 0.0045813)))))
    } else {
        let y = 3.75 / ax;
        (ax.exp() / ax.sqrt())
            * (0.39894228
                + y * (0.01328592
                    + y * (0.00225319
                        + y * (-0.00157565
                            + y * (0.00916281
                                + y * (-0.02057706
                                    + y * (0.02635537 + y * (-0.01647633 + y * 0.00392377))))))))
    }
}

#[inline(always)]
fn dot(a: &[Sample], b: &[Sample]) -> Sample {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// ═══════════════════════════════════════════════════════════════════════════════
// HALF-BAND STAGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-length history written twice so the newest `len` samples are
/// always one contiguous slice (oldest first).
#[derive(Debug, Clone)]
struct History {
    buf: Vec<Sample>,
    pos: usize,
    len: usize,
}

impl History {
    fn new(len: usize) -> Self {
        Self {
            buf: vec![0.0; 2 * len],
            pos: 0,
            len,
        }
    }

    #[inline(always)]
    fn push(&mut self, x: Sample) {
        self.buf[self.pos] = x;
        self.buf[self.pos + self.len] = x;
        self.pos += 1;
        if self.pos == self.len {
            self.pos = 0;
        }
    }

    #[inline(always)]
    fn window(&self) -> &[Sample] {
        &self.buf[self.pos..self.pos + self.len]
    }

    /// Sample pushed `d` pushes before the newest one
    #[inline(always)]
    fn delayed(&self, d: usize) -> Sample {
        self.buf[self.pos + self.len - 1 - d]
    }

    fn clear(&mut self) {
        self.buf.fill(0.0);
        self.pos = 0;
    }
}

#[derive(Debug, Clone)]
struct HalfbandStage {
    /// Odd-indexed taps, reversed to match `History::window` ordering
    taps_rev: Vec<Sample>,
    /// Centre tap position in low-rate samples
    center_delay: usize,
    up: History,
    down_even: History,
    down_odd: History,
}

impl HalfbandStage {
    fn new(taps: usize) -> Self {
        let h = design_halfband(taps);
        let mut taps_rev: Vec<Sample> = h.iter().skip(1).step_by(2).copied().collect();
        taps_rev.reverse();
        let len = taps_rev.len();

        Self {
            taps_rev,
            center_delay: (taps - 1) / 4,
            up: History::new(len),
            down_even: History::new(len),
            down_odd: History::new(len),
        }
    }

    /// y[2n] is the delayed input, y[2n+1] the odd polyphase branch (gain 2)
    fn upsample(&mut self, input: &[Sample], output: &mut [Sample]) {
        for (&x, pair) in input.iter().zip(output.chunks_exact_mut(2)) {
            self.up.push(x);
            pair[0] = self.up.delayed(self.center_delay);
            pair[1] = 2.0 * dot(&self.taps_rev, self.up.window());
        }
    }

    /// Full FIR at the high rate, evaluated on even indices only
    fn downsample(&mut self, input: &[Sample], output: &mut [Sample]) {
        for (pair, y) in input.chunks_exact(2).zip(output.iter_mut()) {
            self.down_even.push(pair[0]);
            *y = 0.5 * self.down_even.delayed(self.center_delay)
                + dot(&self.taps_rev, self.down_odd.window());
            self.down_odd.push(pair[1]);
        }
    }

    fn reset(&mut self) {
        self.up.clear();
        self.down_even.clear();
        self.down_odd.clear();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OVERSAMPLER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
enum Scratch {
    Input,
    Ping,
    Pong,
}

/// Single-channel cascaded oversampler
#[derive(Debug, Clone)]
pub struct Oversampler {
    stages: Vec<HalfbandStage>,
    factor: OversampleFactor,
    ping: Vec<Sample>,
    pong: Vec<Sample>,
}

impl Oversampler {
    /// Allocate every stage and scratch buffer for blocks up to `max_block_size`
    pub fn new(max_block_size: usize) -> Self {
        let scratch = max_block_size * MAX_FACTOR / 2;
        Self {
            stages: STAGE_TAPS.iter().map(|&taps| HalfbandStage::new(taps)).collect(),
            factor: OversampleFactor::X1,
            ping: vec![0.0; scratch],
            pong: vec![0.0; scratch],
        }
    }

    #[inline]
    pub fn factor(&self) -> OversampleFactor {
        self.factor
    }

    /// Switch factor; stage state is cleared when it changes
    pub fn set_factor(&mut self, factor: OversampleFactor) {
        if factor != self.factor {
            self.factor = factor;
            self.reset();
        }
    }

    /// Upsample `input` into `output`, returning `input.len() * factor`
    pub fn upsample(&mut self, input: &[Sample], output: &mut [Sample]) -> usize {
        let stages = self.factor.stages();
        let out_len = input.len() * self.factor.factor();
        if stages == 0 {
            output[..input.len()].copy_from_slice(input);
            return out_len;
        }

        let mut len = input.len();
        let mut src = Scratch::Input;
        for (s, stage) in self.stages[..stages].iter_mut().enumerate() {
            let next = len * 2;
            let last = s + 1 == stages;
            match (src, last) {
                (Scratch::Input, true) => stage.upsample(input, &mut output[..next]),
                (Scratch::Input, false) => stage.upsample(input, &mut self.ping[..next]),
                (Scratch::Ping, true) => stage.upsample(&self.ping[..len], &mut output[..next]),
                (Scratch::Ping, false) => stage.upsample(&self.ping[..len], &mut self.pong[..next]),
                (Scratch::Pong, true) => stage.upsample(&self.pong[..len], &mut output[..next]),
                (Scratch::Pong, false) => stage.upsample(&self.pong[..len], &mut self.ping[..next]),
            }
            src = match src {
                Scratch::Input | Scratch::Pong => Scratch::Ping,
                Scratch::Ping => Scratch::Pong,
            };
            len = next;
        }
        out_len
    }

    /// Downsample `input` (a multiple of the factor long) into `output`
    pub fn downsample(&mut self, input: &[Sample], output: &mut [Sample]) -> usize {
        let stages = self.factor.stages();
        let out_len = input.len() / self.factor.factor();
        if stages == 0 {
            output[..out_len].copy_from_slice(&input[..out_len]);
            return out_len;
        }

        let mut len = input.len();
        let mut src = Scratch::Input;
        for (s, stage) in self.stages[..stages].iter_mut().enumerate().rev() {
            let next = len / 2;
            let last = s == 0;
            match (src, last) {
                (Scratch::Input, true) => stage.downsample(&input[..len], &mut output[..next]),
                (Scratch::Input, false) => stage.downsample(&input[..len], &mut self.ping[..next]),
                (Scratch::Ping, true) => stage.downsample(&self.ping[..len], &mut output[..next]),
                (Scratch::Ping, false) => {
                    stage.downsample(&self.ping[..len], &mut self.pong[..next])
                }
                (Scratch::Pong, true) => stage.downsample(&self.pong[..len], &mut output[..next]),
                (Scratch::Pong, false) => {
                    stage.downsample(&self.pong[..len], &mut self.ping[..next])
                }
            }
            src = match src {
                Scratch::Input | Scratch::Pong => Scratch::Ping,
                Scratch::Ping => Scratch::Pong,
            };
            len = next;
        }
        out_len
    }
}

impl Processor for Oversampler {
    fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    fn latency(&self) -> usize {
        self.factor.filter_delay()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT PREDICTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Prediction is never coarser than this
const MIN_PREDICTION: OversampleFactor = OversampleFactor::X4;

/// Shows an oversampled signal the way a true-peak meter will see it after
/// it has been decimated back to the base rate.
///
/// The signal goes down through the same filters as the output path and
/// back up at no less than 4x, so peaks the decimation creates between
/// base-rate samples appear in the prediction.
#[derive(Debug, Clone)]
pub struct OutputPredictor {
    down: Oversampler,
    up: Oversampler,
    decimated: Vec<Sample>,
}

impl OutputPredictor {
    pub fn new(max_block_size: usize) -> Self {
        Self {
            down: Oversampler::new(max_block_size),
            up: Oversampler::new(max_block_size),
            decimated: vec![0.0; max_block_size],
        }
    }

    /// Factor of the signal being predicted; clears the filter state
    pub fn set_factor(&mut self, factor: OversampleFactor) {
        self.down.set_factor(factor);
        self.up.set_factor(factor.max(MIN_PREDICTION));
        self.reset();
    }

    /// Predicted samples per input sample
    #[inline]
    pub fn resolution(&self) -> usize {
        self.up.factor().factor() / self.down.factor().factor()
    }

    /// Input samples between a sample going in and its prediction coming out
    pub fn lag(&self) -> usize {
        let factor = self.down.factor();
        factor.factor() * (factor.filter_delay() + self.up.factor().filter_delay()) / 2
    }

    /// `input` must be a multiple of the factor long. Writes
    /// `input.len() * resolution()` samples and returns that count.
    pub fn process(&mut self, input: &[Sample], output: &mut [Sample]) -> usize {
        let n = self.down.downsample(input, &mut self.decimated);
        self.up.upsample(&self.decimated[..n], output)
    }
}

impl Processor for OutputPredictor {
    fn reset(&mut self) {
        self.down.reset();
        self.up.reset();
    }

    fn latency(&self) -> usize {
        self.lag()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRUE PEAK DETECTOR
// ═══════════════════════════════════════════════════════════════════════════════

const DETECTOR_CHUNK: usize = 1024;

/// Standalone true-peak meter built from the same half-band cascade
#[derive(Debug, Clone)]
pub struct TruePeakDetector {
    oversampler: Oversampler,
    scratch: Vec<Sample>,
    peak: f64,
}

impl TruePeakDetector {
    pub fn new(factor: OversampleFactor) -> Self {
        let mut oversampler = Oversampler::new(DETECTOR_CHUNK);
        oversampler.set_factor(factor);
        Self {
            oversampler,
            scratch: vec![0.0; DETECTOR_CHUNK * MAX_FACTOR],
            peak: 0.0,
        }
    }

    /// Measure a block; returns its true peak (linear) and updates the running maximum
    pub fn process(&mut self, block: &[Sample]) -> f64 {
        let mut block_peak: f64 = 0.0;
        for chunk in block.chunks(DETECTOR_CHUNK) {
            let n = self.oversampler.upsample(chunk, &mut self.scratch);
            block_peak = self.scratch[..n]
                .iter()
                .fold(block_peak, |acc, x| acc.max(x.abs()));
        }
        self.peak = self.peak.max(block_peak);
        block_peak
    }

    /// Flush the filter tail so peaks in the last few input samples are seen
    pub fn finish(&mut self) -> f64 {
        let zeros = [0.0; 64];
        self.process(&zeros);
        self.peak
    }

    #[inline]
    pub fn peak(&self) -> f64 {
        self.peak
    }

    pub fn peak_db(&self) -> f64 {
        pf_core::level_db(self.peak)
    }

    pub fn reset(&mut self) {
        self.oversampler.reset();
        self.peak = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn magnitude_db(h: &[f64], freq: f64) -> f64 {
        let (mut re, mut im) = (0.0, 0.0);
        for (i, &c) in h.iter().enumerate() {
            let w = 2.0 * PI * freq * i as f64;
            re += c * w.cos();
            im -= c * w.sin();
        }
        20.0 * (re * re + im * im).sqrt().max(1e-20).log10()
    }

    #[test]
    fn test_ratio_lookup() {
        assert_eq!(OversampleFactor::from_ratio(8), Some(OversampleFactor::X8));
        assert_eq!(OversampleFactor::from_ratio(3), None);
    }

    #[test]
    fn test_filter_delays() {
        let delays: Vec<usize> = OversampleFactor::ALL.iter().map(|f| f.filter_delay()).collect();
        assert_eq!(delays, vec![0, 40, 50, 53, 55, 56]);
    }

    #[test]
    fn test_factor_mapping() {
        assert_eq!(OversampleFactor::from_index(0).factor(), 1);
        assert_eq!(OversampleFactor::from_index(3).factor(), 8);
        assert_eq!(OversampleFactor::from_index(42), OversampleFactor::X32);
        assert_eq!(
            OversampleFactor::X32.clamp(OversampleFactor::X2, OversampleFactor::X4),
            OversampleFactor::X4
        );
        assert_eq!(
            OversampleFactor::X1.clamp(OversampleFactor::X2, OversampleFactor::X4),
            OversampleFactor::X2
        );
    }

    #[test]
    fn test_halfband_structure() {
        for &taps in &STAGE_TAPS {
            let h = design_halfband(taps);
            let center = (taps - 1) / 2;
            assert_eq!(h[center], 0.5);
            for (i, &v) in h.iter().enumerate() {
                if i != center && (i as isize - center as isize) % 2 == 0 {
                    assert_eq!(v, 0.0);
                }
                assert!((v - h[taps - 1 - i]).abs() < 1e-15, "not symmetric");
            }
            let sum: f64 = h.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_stopband_and_ripple() {
        for &taps in &STAGE_TAPS {
            let h = design_halfband(taps);
            // Kaiser transition width estimate, in cycles per sample
            let width = (DESIGN_ATTENUATION_DB - 7.95) / (2.285 * (taps - 1) as f64 * 2.0 * PI);
            let stop = 0.25 + width / 2.0 + 0.01;
            let pass = 0.25 - width / 2.0 - 0.01;

            for i in 0..=200 {
                let f = stop + (0.5 - stop) * i as f64 / 200.0;
                let db = magnitude_db(&h, f);
                assert!(db < -100.0, "{taps} taps: {db:.1} dB at {f:.3}");
            }
            for i in 0..=200 {
                let f = pass * i as f64 / 200.0;
                let db = magnitude_db(&h, f);
                assert!(db.abs() < 0.01, "{taps} taps: ripple {db:.4} dB at {f:.3}");
            }
        }
    }

    #[test]
    fn test_output_lengths() {
        let mut os = Oversampler::new(64);
        let input = vec![0.1; 64];
        let mut up = vec![0.0; 64 * MAX_FACTOR];
        let mut down = vec![0.0; 64];
        for factor in OversampleFactor::ALL {
            os.set_factor(factor);
            let n = os.upsample(&input, &mut up);
            assert_eq!(n, 64 * factor.factor());
            assert_eq!(os.downsample(&up[..n], &mut down), 64);
        }
    }

    #[test]
    fn test_dc_is_unity() {
        let mut os = Oversampler::new(256);
        let input = vec![0.5; 256];
        let mut up = vec![0.0; 256 * MAX_FACTOR];
        for factor in OversampleFactor::ALL {
            os.set_factor(factor);
            let mut n = 0;
            for _ in 0..4 {
                n = os.upsample(&input, &mut up);
            }
            for &v in &up[..n] {
                assert!((v - 0.5).abs() < 1e-9, "{factor:?}: {v}");
            }
        }
    }

    #[test]
    fn test_round_trip_delay() {
        let sample_rate = 48000.0;
        let block = 128;
        for factor in OversampleFactor::ALL {
            let mut os = Oversampler::new(block);
            os.set_factor(factor);
            let delay = factor.filter_delay();

            let total = block * 40;
            let input: Vec<f64> = (0..total)
                .map(|i| 0.5 * (2.0 * PI * 1000.0 * i as f64 / sample_rate).sin())
                .collect();
            let mut output = vec![0.0; total];
            let mut up = vec![0.0; block * MAX_FACTOR];

            for (src, dst) in input.chunks(block).zip(output.chunks_mut(block)) {
                let n = os.upsample(src, &mut up);
                os.downsample(&up[..n], dst);
            }

            for i in (delay + 200)..total {
                let err = (output[i] - input[i - delay]).abs();
                assert!(err < 1e-3, "{factor:?}: error {err} at {i}");
            }
        }
    }

    #[test]
    fn test_prediction_resolution_and_lag() {
        let mut predictor = OutputPredictor::new(64);
        let expected = [(4, 25), (2, 90), (1, 200), (1, 424)];
        for (factor, (resolution, lag)) in OversampleFactor::ALL.iter().zip(expected) {
            predictor.set_factor(*factor);
            assert_eq!(predictor.resolution(), resolution, "{factor:?}");
            assert_eq!(predictor.lag(), lag, "{factor:?}");
        }
    }

    #[test]
    fn test_prediction_tracks_delayed_input() {
        // In-band material comes out of the prediction unchanged, `lag` later
        let block = 128;
        for factor in [OversampleFactor::X1, OversampleFactor::X2, OversampleFactor::X4, OversampleFactor::X8] {
            let mut os = Oversampler::new(block);
            let mut predictor = OutputPredictor::new(block);
            os.set_factor(factor);
            predictor.set_factor(factor);
            let resolution = predictor.resolution();
            let lag = predictor.lag();

            let input: Vec<f64> = (0..block * 40)
                .map(|i| 0.5 * (2.0 * PI * 1234.5 * i as f64 / 48000.0).sin())
                .collect();
            let mut up = Vec::new();
            let mut predicted = Vec::new();
            let mut os_block = vec![0.0; block * MAX_FACTOR];
            let mut out_block = vec![0.0; block * MAX_FACTOR];
            for chunk in input.chunks(block) {
                let n = os.upsample(chunk, &mut os_block);
                let m = predictor.process(&os_block[..n], &mut out_block);
                up.extend_from_slice(&os_block[..n]);
                predicted.extend_from_slice(&out_block[..m]);
            }

            assert_eq!(predicted.len(), up.len() * resolution);
            for k in (up.len() / 2)..(up.len() - lag) {
                let err = (predicted[(k + lag) * resolution] - up[k]).abs();
                assert!(err < 1e-4, "{factor:?}: error {err} at {k}");
            }
        }
    }

    #[test]
    fn test_true_peak_detects_intersample_peak() {
        // fs/4 sine sampled at +-45 degrees: sample peak is 0.707, true peak 1.0.
        // Faded in and out so the onset does not ring.
        let len = 4096;
        let fade = 512;
        let block: Vec<f64> = (0..len)
            .map(|i| {
                let edge = i.min(len - 1 - i);
                let env = if edge < fade {
                    0.5 - 0.5 * (PI * edge as f64 / fade as f64).cos()
                } else {
                    1.0
                };
                env * (PI / 2.0 * i as f64 + PI / 4.0).sin()
            })
            .collect();
        let sample_peak = block.iter().fold(0.0f64, |a, x| a.max(x.abs()));
        assert!(sample_peak < 0.71);

        let mut detector = TruePeakDetector::new(OversampleFactor::X4);
        detector.process(&block);
        let tp = detector.finish();
        assert!(tp > 0.98 && tp < 1.02, "true peak {tp}");
    }
}
