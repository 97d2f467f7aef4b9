//! pf-dsp: True-peak limiter DSP for PeakForge
//!
//! Real-time, allocation-free, two-stage lookahead limiter.
//!
//! ## Modules
//! - `oversampling` - Cascaded 2x Kaiser half-band up/down-samplers, true-peak detector
//! - `lookahead` - Lookahead ring buffer and smooth gain planner
//! - `dynamics` - Two-stage gain engine (transient containment + sustain shaper)
//! - `style` - The eight limiter styles and their morphing
//! - `stereo` - Stereo linker and Mid/Side codec
//! - `ceiling` - Final ceiling/safety stage with fault detection
//! - `dither` - TPDF / noise-shaped dither
//! - `delay` - Dry path latency compensation
//! - `smoothing` - One-pole gain ramps for trim, drive and mix; path crossfade
//! - `params` - Lock-free parameter store and latency profiles
//! - `metering` - Lock-free meter snapshot and gain-reduction peak hold
//! - `path` - One oversampled limiting path, primed on settings changes
//! - `limiter` - The complete engine and its host handle

pub mod ceiling;
pub mod delay;
pub mod dither;
pub mod dynamics;
pub mod limiter;
pub mod lookahead;
pub mod metering;
pub mod oversampling;
pub mod params;
pub mod path;
pub mod smoothing;
pub mod stereo;
pub mod style;

pub use dither::{DitherBits, DitherShape};
pub use dynamics::EnvelopePhase;
pub use limiter::{LimiterConfig, LimiterHandle, MAX_BLOCK_SIZE, TruePeakLimiter};
pub use metering::{MeterId, MeterSnapshot};
pub use oversampling::{OutputPredictor, OversampleFactor, TruePeakDetector};
pub use params::{LatencyProfile, ParamId};
pub use style::LimiterStyle;

/// Trait for all DSP processors
pub trait Processor: Send + Sync {
    /// Reset processor state
    fn reset(&mut self);

    /// Get latency in samples
    fn latency(&self) -> usize {
        0
    }
}
