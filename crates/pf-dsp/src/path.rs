//! Oversampled signal path
//!
//! One complete limiting path for a fixed oversampling factor and lookahead:
//! upsample -> plan -> Stage A/B -> link -> apply -> ceiling -> downsample.
//!
//! Gain is planned against two views of the signal:
//! - the oversampled input as it passes through the lookahead ring
//! - an [`OutputPredictor`] view of the decimated output, which carries the
//!   intersample peaks the downsampler adds
//!
//! The output view arrives `lag` samples late, so its planner runs with
//! `delay - lag` of lookahead and is left out when the lookahead is shorter
//! than the lag.
//!
//! The engine keeps two paths. A settings change primes the idle one from
//! recent base-rate input and crossfades over to it.

use pf_core::Sample;

use crate::Processor;
use crate::ceiling::CeilingStage;
use crate::dynamics::{ChannelGain, EnvelopePhase};
use crate::lookahead::{GainPlanner, LookaheadBuffer, required_gain};
use crate::oversampling::{MAX_FACTOR, OutputPredictor, OversampleFactor, Oversampler};
use crate::stereo::StereoLinker;
use crate::style::StyleDescriptor;

/// Base-rate input replayed beyond twice the lookahead when priming; covers
/// the warm-up of the upsampler and of the output prediction
pub const PRIME_MARGIN: usize = 192;

/// Base-rate samples of tapped signal run through the output filters when priming
const PRIME_TAIL: usize = 64;

/// Requirement per engine channel. Under M/S the decoded L/R peak is
/// `|m| + |s|`, so both channels get the joint requirement.
#[inline(always)]
fn requirements(levels: [Sample; 2], ceiling: f64, mid_side: bool) -> [f64; 2] {
    if mid_side {
        let joint = required_gain(levels[0].abs() + levels[1].abs(), ceiling);
        [joint; 2]
    } else {
        [
            required_gain(levels[0], ceiling),
            required_gain(levels[1], ceiling),
        ]
    }
}

#[inline(always)]
fn peak(window: &[Sample]) -> Sample {
    window.iter().fold(0.0, |acc: f64, x| acc.max(x.abs()))
}

/// What one block through a path produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathBlock {
    /// Lowest applied gain per engine channel
    pub min_gain: [f64; 2],
    /// Base-rate index of the first non-finite sample
    pub fault: Option<usize>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LANE
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything one engine channel owns inside a path
#[derive(Debug, Clone)]
struct Lane {
    oversampler: Oversampler,
    predictor: OutputPredictor,
    ring: LookaheadBuffer,
    planner: GainPlanner,
    output_planner: GainPlanner,
    gain: ChannelGain,
    /// Gain applied to the last oversampled sample
    applied: f64,
    os: Vec<Sample>,
    predicted: Vec<Sample>,
}

impl Lane {
    fn new(max_block_size: usize, max_delay: usize, sample_rate: f64) -> Self {
        Self {
            oversampler: Oversampler::new(max_block_size),
            predictor: OutputPredictor::new(max_block_size),
            ring: LookaheadBuffer::new(max_delay),
            planner: GainPlanner::new(max_delay),
            output_planner: GainPlanner::new(max_delay),
            gain: ChannelGain::new(sample_rate),
            applied: 1.0,
            os: vec![0.0; max_block_size * MAX_FACTOR],
            predicted: vec![0.0; max_block_size * MAX_FACTOR],
        }
    }

    /// Upsample a base-rate block (and predict its output when `predict`);
    /// returns the oversampled length
    fn expand(&mut self, input: &[Sample], predict: bool) -> usize {
        let len = self.oversampler.upsample(input, &mut self.os);
        if predict {
            self.predictor.process(&self.os[..len], &mut self.predicted);
        }
        len
    }

    /// Signal state only; envelopes are left alone
    fn clear_signal(&mut self) {
        self.oversampler.reset();
        self.predictor.reset();
        self.ring.clear();
        self.planner.reset();
        self.output_planner.reset();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNAL PATH
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct SignalPath {
    lanes: [Lane; 2],
    factor: OversampleFactor,
    /// Base-rate samples
    lookahead: usize,
    /// Oversampled samples
    delay: usize,
    predict: bool,
    resolution: usize,
    max_block_size: usize,
    /// Base-rate scratch for priming
    scratch: [Vec<Sample>; 2],
}

impl SignalPath {
    /// Allocate for lookaheads up to `max_lookahead` base-rate samples
    pub fn new(max_block_size: usize, max_lookahead: usize, sample_rate: f64) -> Self {
        let max_delay = max_lookahead * MAX_FACTOR;
        let mut path = Self {
            lanes: std::array::from_fn(|_| Lane::new(max_block_size, max_delay, sample_rate)),
            factor: OversampleFactor::X1,
            lookahead: 0,
            delay: 0,
            predict: false,
            resolution: 1,
            max_block_size,
            scratch: std::array::from_fn(|_| vec![0.0; max_block_size]),
        };
        path.configure(OversampleFactor::X1, 0);
        path
    }

    #[inline]
    pub fn factor(&self) -> OversampleFactor {
        self.factor
    }

    /// Base-rate samples
    #[inline]
    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    /// Whether the decimated output is planned for as well as the input
    #[inline]
    pub fn predicts_output(&self) -> bool {
        self.predict
    }

    pub fn envelope_phase(&self, channel: usize) -> EnvelopePhase {
        self.lanes[channel.min(1)].gain.phase()
    }

    /// Take on new settings with cleared signal state. Envelopes carry over.
    pub fn configure(&mut self, factor: OversampleFactor, lookahead: usize) {
        self.factor = factor;
        self.lookahead = lookahead;
        self.delay = lookahead * factor.factor();
        for lane in &mut self.lanes {
            lane.oversampler.set_factor(factor);
            lane.predictor.set_factor(factor);
        }
        let lag = self.lanes[0].predictor.lag();
        self.predict = self.delay >= lag;
        self.resolution = self.lanes[0].predictor.resolution();
        let output_delay = if self.predict { self.delay - lag } else { 0 };
        for lane in &mut self.lanes {
            lane.clear_signal();
            lane.planner.set_delay(self.delay);
            lane.output_planner.set_delay(output_delay);
        }
    }

    /// Per-block gain engine coefficients
    pub fn configure_gains(
        &mut self,
        style: &StyleDescriptor,
        attack_ms: f64,
        release_ms: f64,
        sample_rate: f64,
    ) {
        let os_rate = sample_rate * self.factor.factor() as f64;
        for lane in &mut self.lanes {
            lane.gain.configure(style, attack_ms, release_ms, os_rate);
        }
    }

    /// Write oversampled index `i` into the rings and return the planned
    /// gain for the samples now at the delay tap
    #[inline(always)]
    fn plan(&mut self, i: usize, ceiling: f64, mid_side: bool) -> [f64; 2] {
        let [a, b] = &mut self.lanes;
        let x = [a.os[i], b.os[i]];
        a.ring.write(x[0]);
        b.ring.write(x[1]);

        let required = requirements(x, ceiling, mid_side);
        let mut planned = [a.planner.push(required[0]), b.planner.push(required[1])];

        if self.predict {
            let window = i * self.resolution..(i + 1) * self.resolution;
            let levels = [
                peak(&a.predicted[window.clone()]),
                peak(&b.predicted[window]),
            ];
            let required = requirements(levels, ceiling, mid_side);
            planned[0] = planned[0].min(a.output_planner.push(required[0]));
            planned[1] = planned[1].min(b.output_planner.push(required[1]));
        }
        planned
    }

    /// Limit one block of engine-domain input into `output`
    pub fn process(
        &mut self,
        input: [&[Sample]; 2],
        output: [&mut [Sample]; 2],
        ceiling: f64,
        mid_side: bool,
        linker: &StereoLinker,
        stage: &mut CeilingStage,
    ) -> PathBlock {
        let n = input[0].len();
        let predict = self.predict;
        let mut len = 0;
        for (lane, x) in self.lanes.iter_mut().zip(input) {
            len = lane.expand(x, predict);
        }

        let delay = self.delay;
        let mut min_gain = [1.0f64; 2];
        for i in 0..len {
            let planned = self.plan(i, ceiling, mid_side);
            let [a, b] = &mut self.lanes;
            let (ga, gb) = linker.apply(a.gain.process(planned[0]), b.gain.process(planned[1]));
            for (ch, (lane, g)) in [(a, ga), (b, gb)].into_iter().enumerate() {
                lane.os[i] = lane.ring.tap(delay) * g;
                lane.applied = g;
                min_gain[ch] = min_gain[ch].min(g);
            }
        }

        let fault = {
            let [a, b] = &mut self.lanes;
            stage.process(&mut a.os[..len], &mut b.os[..len], mid_side)
        };
        if let Some(first) = fault {
            for lane in &mut self.lanes {
                lane.os[first..len].fill(0.0);
            }
        }

        for (lane, y) in self.lanes.iter_mut().zip(output) {
            lane.oversampler.downsample(&lane.os[..len], &mut y[..n]);
        }

        PathBlock {
            min_gain,
            fault: fault.map(|first| first / self.factor.factor()),
        }
    }

    /// Rebuild signal state from `history` (base-rate engine input, newest
    /// last) so this path can take over from `previous` mid-stream.
    ///
    /// Call after [`SignalPath::configure`]. The replayed span refills the
    /// filters, the rings and both planners. The envelopes and the last
    /// applied gains are copied from `previous`, and the output filters are
    /// run over the most recent tapped signal at that gain. Envelope
    /// coefficients come along too; reconfigure the gains afterwards.
    pub fn prime(
        &mut self,
        history: &[LookaheadBuffer; 2],
        previous: &SignalPath,
        ceiling: f64,
        mid_side: bool,
    ) {
        let factor = self.factor.factor();
        let span = (2 * self.lookahead + 1 + PRIME_MARGIN).min(history[0].capacity());
        let mut age = span;
        while age > 0 {
            let n = age.min(self.max_block_size);
            let mut len = 0;
            for ((lane, line), scratch) in self.lanes.iter_mut().zip(history).zip(&mut self.scratch) {
                for (j, x) in scratch[..n].iter_mut().enumerate() {
                    *x = line.tap(age - 1 - j);
                }
                len = lane.expand(&scratch[..n], self.predict);
            }
            for i in 0..len {
                self.plan(i, ceiling, mid_side);
            }
            age -= n;
        }

        let delay = self.delay;
        for ((lane, old), scratch) in self.lanes.iter_mut().zip(&previous.lanes).zip(&mut self.scratch) {
            lane.gain.clone_from(&old.gain);
            lane.applied = old.applied;

            // What the previous path already output sits at ages `delay` and up
            let mut remaining = PRIME_TAIL;
            while remaining > 0 {
                let n = remaining.min(self.max_block_size);
                let len = n * factor;
                let oldest = delay + remaining * factor - 1;
                for (j, x) in lane.os[..len].iter_mut().enumerate() {
                    *x = lane.ring.tap(oldest - j) * lane.applied;
                }
                lane.oversampler.downsample(&lane.os[..len], &mut scratch[..n]);
                remaining -= n;
            }
        }
    }
}

impl Processor for SignalPath {
    /// Back to unity and silence; settings are kept
    fn reset(&mut self) {
        for lane in &mut self.lanes {
            lane.clear_signal();
            lane.gain.reset();
            lane.applied = 1.0;
        }
    }

    fn latency(&self) -> usize {
        self.lookahead + self.factor.filter_delay()
    }
}
