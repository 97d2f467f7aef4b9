//! True-peak limiter engine
//!
//! Per block (base rate unless noted):
//! input peak meter -> dry delay -> trim/drive -> M/S encode -> signal path
//! (see [`crate::path`]) -> path crossfade -> dither -> M/S decode -> dry/wet mix.
//!
//! Two signal paths are kept. An oversampling or lookahead change primes the
//! idle path from recent input and crossfades to it over [`PATH_FADE_MS`];
//! further changes wait for the fade to finish.
//!
//! Everything is allocated in [`TruePeakLimiter::new`]; `process_block`
//! neither allocates nor locks. The host talks to the engine through a
//! [`LimiterHandle`] (atomic parameter and meter slots).

use std::sync::Arc;

use pf_core::{
    MAX_SAMPLE_RATE, MIN_SAMPLE_RATE, PfError, PfResult, Sample, db_to_gain, level_db,
    reduction_db,
};

use crate::Processor;
use crate::ceiling::CeilingStage;
use crate::delay::DelayLine;
use crate::dither::{Dither, DitherShape};
use crate::dynamics::EnvelopePhase;
use crate::lookahead::LookaheadBuffer;
use crate::metering::{DEFAULT_GR_HOLD_MS, GrPeakHold, LimiterMeters, MeterId, MeterSnapshot};
use crate::oversampling::OversampleFactor;
use crate::params::{LimiterParams, ParamId, ParamSnapshot};
use crate::path::{PRIME_MARGIN, SignalPath};
use crate::smoothing::{Crossfade, GainRamp};
use crate::stereo::{StereoLinker, decode_mid_side, encode_mid_side};
use crate::style::StyleMorph;

/// Largest block a host may declare at construction
pub const MAX_BLOCK_SIZE: usize = 8192;

/// Longest lookahead any profile permits
pub const MAX_LOOKAHEAD_MS: f64 = 20.0;

/// Crossfade between signal paths after an oversampling or lookahead change
pub const PATH_FADE_MS: f64 = 10.0;

const DITHER_SEEDS: [u64; 2] = [0x853c49e6748fea9b, 0xda3e39cb94b95bdb];

/// Lookahead in base-rate samples
#[inline]
fn lookahead_samples(ms: f64, sample_rate: f64) -> usize {
    (ms * sample_rate / 1000.0).round().max(0.0) as usize
}

#[inline]
fn block_peak(block: &[Sample]) -> f64 {
    block
        .iter()
        .filter(|x| x.is_finite())
        .fold(0.0, |acc: f64, x| acc.max(x.abs()))
}

/// `(paths[index], the other one)`
#[inline]
fn split_paths(paths: &mut [SignalPath; 2], index: usize) -> (&mut SignalPath, &mut SignalPath) {
    let [a, b] = paths;
    if index == 0 { (a, b) } else { (b, a) }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Construction-time settings
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterConfig {
    pub sample_rate: f64,
    /// Largest block processed in one pass; longer host blocks are chunked
    pub max_block_size: usize,
    pub dither_shape: DitherShape,
    /// Gain-reduction peak-hold decay time (ms)
    pub gr_hold_ms: f64,
}

impl LimiterConfig {
    pub fn new(sample_rate: f64, max_block_size: usize) -> Self {
        Self {
            sample_rate,
            max_block_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PfResult<()> {
        if !self.sample_rate.is_finite()
            || self.sample_rate < MIN_SAMPLE_RATE
            || self.sample_rate > MAX_SAMPLE_RATE
        {
            return Err(PfError::InvalidSampleRate(self.sample_rate));
        }
        if self.max_block_size == 0 || self.max_block_size > MAX_BLOCK_SIZE {
            return Err(PfError::InvalidBlockSize(self.max_block_size));
        }
        Ok(())
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            max_block_size: 512,
            dither_shape: DitherShape::Tpdf,
            gr_hold_ms: DEFAULT_GR_HOLD_MS,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOST HANDLE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct Shared {
    params: LimiterParams,
    meters: LimiterMeters,
}

/// Host-side access to parameters, meters, fault count and latency.
///
/// Cheap to clone and safe to use from any thread.
#[derive(Debug, Clone)]
pub struct LimiterHandle {
    shared: Arc<Shared>,
}

impl LimiterHandle {
    /// Clamped write; returns false if the value was dropped as non-finite
    pub fn set_param(&self, id: ParamId, value: f64) -> bool {
        self.shared.params.set(id, value)
    }

    /// Write by raw index; unknown indices are ignored
    pub fn set_param_index(&self, index: usize, value: f64) -> bool {
        self.shared.params.set_index(index, value)
    }

    pub fn set_param_by_name(&self, name: &str, value: f64) -> PfResult<()> {
        let id = ParamId::from_name(name)
            .ok_or_else(|| PfError::InvalidParam(format!("unknown parameter '{name}'")))?;
        if self.set_param(id, value) {
            Ok(())
        } else {
            Err(PfError::InvalidParam(format!("{name} = {value}")))
        }
    }

    /// Write a 0-1 normalized value
    pub fn set_normalized(&self, id: ParamId, normalized: f64) -> bool {
        self.set_param(id, id.spec().range.denormalize(normalized))
    }

    #[inline]
    pub fn param(&self, id: ParamId) -> f64 {
        self.shared.params.get(id)
    }

    pub fn normalized(&self, id: ParamId) -> f64 {
        id.spec().range.normalize(self.param(id))
    }

    pub fn reset_params(&self) {
        self.shared.params.reset_to_defaults();
    }

    /// Meter values, at most one block stale
    pub fn meters(&self) -> MeterSnapshot {
        self.shared.meters.snapshot()
    }

    #[inline]
    pub fn meter(&self, id: MeterId) -> f64 {
        self.shared.meters.get(id)
    }

    /// Blocks in which non-finite audio reached the ceiling stage
    #[inline]
    pub fn fault_count(&self) -> u64 {
        self.shared.meters.fault_count()
    }

    /// Reported latency in base-rate samples
    #[inline]
    pub fn latency_samples(&self) -> usize {
        self.shared.meters.latency()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Settings that only change at block boundaries
#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveSettings {
    factor: OversampleFactor,
    /// Base-rate samples
    lookahead: usize,
    latency: usize,
}

/// Two-stage true-peak limiter
pub struct TruePeakLimiter {
    sample_rate: f64,
    max_block_size: usize,
    shared: Arc<Shared>,

    // Oversampled paths; `current` carries the output, the other is idle
    // or fading out
    paths: [SignalPath; 2],
    current: usize,
    fade: Crossfade,
    /// Engine-domain input, newest last, for priming
    history: [LookaheadBuffer; 2],
    has_history: bool,
    style: StyleMorph,
    linker: StereoLinker,
    ceiling: CeilingStage,

    // Base-rate path
    dithers: [Dither; 2],
    dry_lines: [DelayLine; 2],
    drive: GainRamp,
    mix: GainRamp,
    hold: GrPeakHold,

    // Scratch
    staged: [Vec<Sample>; 2],
    wet: [Vec<Sample>; 2],
    fading: [Vec<Sample>; 2],
    dry: [Vec<Sample>; 2],

    active: ActiveSettings,
}

impl TruePeakLimiter {
    pub fn new(config: LimiterConfig) -> PfResult<Self> {
        config.validate()?;

        let sample_rate = config.sample_rate;
        let block = config.max_block_size;
        let max_lookahead = lookahead_samples(MAX_LOOKAHEAD_MS, sample_rate);
        let max_latency = max_lookahead + OversampleFactor::X32.filter_delay();

        let shared = Arc::new(Shared {
            params: LimiterParams::new(),
            meters: LimiterMeters::new(),
        });
        let params = shared.params.snapshot();

        let mut limiter = Self {
            sample_rate,
            max_block_size: block,
            shared,
            paths: std::array::from_fn(|_| SignalPath::new(block, max_lookahead, sample_rate)),
            current: 0,
            fade: Crossfade::new(sample_rate, PATH_FADE_MS),
            history: std::array::from_fn(|_| LookaheadBuffer::new(max_lookahead + PRIME_MARGIN)),
            has_history: false,
            style: StyleMorph::new(params.style, sample_rate),
            linker: StereoLinker::new(),
            ceiling: CeilingStage::new(),
            dithers: std::array::from_fn(|ch| Dither::new(config.dither_shape, DITHER_SEEDS[ch])),
            dry_lines: std::array::from_fn(|_| DelayLine::new(max_latency)),
            drive: GainRamp::new(sample_rate, db_to_gain(params.drive_db())),
            mix: GainRamp::new(sample_rate, params.mix / 100.0),
            hold: GrPeakHold::new(config.gr_hold_ms),
            staged: std::array::from_fn(|_| vec![0.0; block]),
            wet: std::array::from_fn(|_| vec![0.0; block]),
            fading: std::array::from_fn(|_| vec![0.0; block]),
            dry: std::array::from_fn(|_| vec![0.0; block]),
            active: ActiveSettings {
                factor: OversampleFactor::X1,
                lookahead: 0,
                latency: 0,
            },
        };
        limiter.apply_settings(&params);

        log::info!(
            "True-peak limiter ready: {} Hz, max block {}, latency {} samples",
            sample_rate,
            block,
            limiter.active.latency
        );
        Ok(limiter)
    }

    /// Handle for the host thread
    pub fn handle(&self) -> LimiterHandle {
        LimiterHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Oversampling factor in effect for the last block
    #[inline]
    pub fn oversample_factor(&self) -> OversampleFactor {
        self.active.factor
    }

    /// Reported latency in base-rate samples
    #[inline]
    pub fn latency_samples(&self) -> usize {
        self.active.latency
    }

    /// Envelope phase of engine channel 0 or 1
    pub fn envelope_phase(&self, channel: usize) -> EnvelopePhase {
        self.paths[self.current].envelope_phase(channel)
    }

    /// Whether a crossfade between signal paths is under way
    #[inline]
    pub fn is_switching(&self) -> bool {
        self.fade.is_active()
    }

    /// Samples the ceiling stage had to clamp since the last reset. Planned
    /// gain leaves nothing to clamp, so anything above zero is a defect.
    pub fn residual_clamps(&self) -> u64 {
        self.ceiling.clamped()
    }

    /// Pick up oversampling, lookahead and latency from the current
    /// parameters without processing audio. Call from the thread that owns
    /// the engine, never concurrently with `process_block`.
    pub fn apply_params(&mut self) {
        let params = self.shared.params.snapshot();
        self.apply_settings(&params);
    }

    /// Process a stereo block in place. Blocks longer than the configured
    /// maximum are processed in chunks.
    pub fn process_block(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        debug_assert_eq!(left.len(), right.len());
        let len = left.len().min(right.len());
        let mut offset = 0;
        while offset < len {
            let n = (len - offset).min(self.max_block_size);
            self.process_chunk(&mut left[offset..offset + n], &mut right[offset..offset + n]);
            offset += n;
        }
    }

    /// Pick up oversampling and lookahead changes at a block boundary.
    ///
    /// Mid-stream the idle path is primed and faded in; with no audio seen
    /// yet the current path is reconfigured directly.
    fn apply_settings(&mut self, params: &ParamSnapshot) {
        let (lookahead_ms, factor) = params.profile.constrain(params.lookahead_ms, params.oversampling);
        let lookahead = lookahead_samples(lookahead_ms, self.sample_rate);
        if factor == self.active.factor && lookahead == self.active.lookahead {
            return;
        }
        if self.fade.is_active() {
            return;
        }

        if self.has_history {
            let next = 1 - self.current;
            let (incoming, outgoing) = split_paths(&mut self.paths, next);
            incoming.configure(factor, lookahead);
            incoming.prime(
                &self.history,
                outgoing,
                db_to_gain(params.ceiling_db),
                params.mid_side_active(),
            );
            self.current = next;
            self.fade.start();
        } else {
            self.paths[self.current].configure(factor, lookahead);
        }

        let latency = lookahead + factor.filter_delay();
        for line in &mut self.dry_lines {
            line.set_delay(latency);
        }
        self.active = ActiveSettings {
            factor,
            lookahead,
            latency,
        };
        self.shared.meters.set_latency(latency);
    }

    fn process_chunk(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let n = left.len();
        let params = self.shared.params.snapshot();
        self.apply_settings(&params);

        let ceiling = db_to_gain(params.ceiling_db);
        let mid_side = params.mid_side_active();

        self.style.set_target(params.style);
        let style = *self.style.advance(n);
        let fading = self.fade.is_active();
        for (index, path) in self.paths.iter_mut().enumerate() {
            if index == self.current || fading {
                path.configure_gains(&style, params.attack_ms, params.release_ms, self.sample_rate);
            }
        }
        self.linker.set_link_percent(params.effective_link());
        self.ceiling.set_ceiling(ceiling);
        for dither in &mut self.dithers {
            dither.set_bits(params.dither);
        }

        let mut meters = MeterSnapshot::silent();
        meters.set(MeterId::InputPeakL, level_db(block_peak(left)));
        meters.set(MeterId::InputPeakR, level_db(block_peak(right)));

        // Latency-aligned dry copy
        self.dry_lines[0].process(left, &mut self.dry[0][..n]);
        self.dry_lines[1].process(right, &mut self.dry[1][..n]);

        // Trim + threshold drive
        self.drive.retarget(db_to_gain(params.drive_db()));
        {
            let [in_a, in_b] = &mut self.staged;
            for i in 0..n {
                let g = self.drive.tick();
                in_a[i] = left[i] * g;
                in_b[i] = right[i] * g;
            }
            if mid_side {
                encode_mid_side(&mut in_a[..n], &mut in_b[..n]);
            }
        }
        for (line, input) in self.history.iter_mut().zip(&self.staged) {
            for &x in &input[..n] {
                line.write(x);
            }
        }
        self.has_history = true;

        let (fault, min_gain) = {
            let (active, outgoing) = split_paths(&mut self.paths, self.current);
            let [in_a, in_b] = &self.staged;
            let input = [&in_a[..n], &in_b[..n]];
            let [wet_a, wet_b] = &mut self.wet;
            let block = active.process(
                input,
                [&mut wet_a[..n], &mut wet_b[..n]],
                ceiling,
                mid_side,
                &self.linker,
                &mut self.ceiling,
            );
            let mut fault = block.fault;
            let mut min_gain = block.min_gain;

            if fading {
                let [old_a, old_b] = &mut self.fading;
                let old = outgoing.process(
                    input,
                    [&mut old_a[..n], &mut old_b[..n]],
                    ceiling,
                    mid_side,
                    &self.linker,
                    &mut self.ceiling,
                );
                fault = match (fault, old.fault) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                for (gain, old) in min_gain.iter_mut().zip(old.min_gain) {
                    *gain = gain.min(old);
                }
                for i in 0..n {
                    let w = self.fade.tick();
                    wet_a[i] = old_a[i] + (wet_a[i] - old_a[i]) * w;
                    wet_b[i] = old_b[i] + (wet_b[i] - old_b[i]) * w;
                }
            }
            (fault, min_gain)
        };
        let peaks = self.ceiling.take_peaks();

        for (dither, wet) in self.dithers.iter_mut().zip(&mut self.wet) {
            dither.process_block(&mut wet[..n]);
        }

        {
            let [wet_a, wet_b] = &mut self.wet;
            if mid_side {
                decode_mid_side(&mut wet_a[..n], &mut wet_b[..n]);
            }

            self.mix.retarget(params.mix / 100.0);
            for i in 0..n {
                let m = self.mix.tick();
                if m >= 1.0 {
                    left[i] = wet_a[i];
                    right[i] = wet_b[i];
                } else {
                    left[i] = self.dry[0][i] * (1.0 - m) + wet_a[i] * m;
                    right[i] = self.dry[1][i] * (1.0 - m) + wet_b[i] * m;
                }
            }
        }

        if let Some(start) = fault {
            left[start..].fill(0.0);
            right[start..].fill(0.0);
            self.shared.meters.record_fault();
            self.reset_dsp();
        }

        // Mid/side reductions both land on L and R
        let mut gr = [reduction_db(min_gain[0]), reduction_db(min_gain[1])];
        if mid_side {
            gr = [gr[0].max(gr[1]); 2];
        }
        meters.set(MeterId::GainReductionL, gr[0]);
        meters.set(MeterId::GainReductionR, gr[1]);
        meters.set(MeterId::OutputTruePeakL, level_db(peaks[0]));
        meters.set(MeterId::OutputTruePeakR, level_db(peaks[1]));
        let hold = self.hold.update(gr[0].max(gr[1]), n as f64 / self.sample_rate);
        meters.set(MeterId::GainReductionHold, hold);
        self.shared.meters.publish(&meters);
    }

    /// Purge all signal history and envelopes
    fn reset_dsp(&mut self) {
        for path in &mut self.paths {
            path.reset();
        }
        for line in &mut self.history {
            line.clear();
        }
        self.has_history = false;
        self.fade.finish();
        for dither in &mut self.dithers {
            dither.reset();
        }
        for line in &mut self.dry_lines {
            line.clear();
        }
        self.ceiling.reset();
    }
}

impl Processor for TruePeakLimiter {
    /// Transport stop: everything back to unity and silence
    fn reset(&mut self) {
        self.reset_dsp();
        self.hold.reset();
        self.style.settle();
        self.drive.settle();
        self.mix.settle();
        self.shared.meters.publish(&MeterSnapshot::silent());
    }

    fn latency(&self) -> usize {
        self.active.latency
    }
}
