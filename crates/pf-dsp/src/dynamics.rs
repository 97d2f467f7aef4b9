//! Two-stage gain engine
//!
//! - Stage A (transient containment): instant attack onto the planned gain,
//!   sub-millisecond recovery set by the style. No program dependence.
//! - Stage B (sustain/release shaper): fast and slow envelopes of Stage A's
//!   reduction in dB, combined as `max(fast, anti_pump * slow)`.
//!
//! The applied gain is the tighter of the two, so Stage B can only hold
//! gain down longer; it can never loosen Stage A.

use pf_core::{Sample, reduction_db};
use std::f64::consts::LN_10;

use crate::style::StyleDescriptor;

/// Reduction (dB) below which the Stage B envelopes snap to zero
const ENVELOPE_FLOOR_DB: f64 = 1e-6;

/// Reduction depth at which the release curve doubles the fast release rate
const CURVE_REFERENCE_DB: f64 = 6.0;

/// Gain movement (per sample) below which the envelope counts as steady
const PHASE_EPSILON: f64 = 1e-10;

/// Gains this close to the planned value snap onto it
const UNITY_SNAP: f64 = 1e-9;

#[inline]
fn time_coeff(ms: f64, sample_rate: f64) -> f64 {
    (-1.0 / (ms.max(1e-6) * 0.001 * sample_rate)).exp()
}

#[inline(always)]
fn db_to_gain_fast(reduction_db: f64) -> f64 {
    if reduction_db <= 0.0 {
        1.0
    } else {
        (-reduction_db * LN_10 / 20.0).exp()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGE A
// ═══════════════════════════════════════════════════════════════════════════════

/// Transient containment: follows the planned gain down instantly
#[derive(Debug, Clone)]
pub struct TransientStage {
    gain: f64,
    recovery_coeff: f64,
}

impl TransientStage {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            gain: 1.0,
            recovery_coeff: time_coeff(0.1, sample_rate),
        }
    }

    pub fn set_recovery(&mut self, ms: f64, sample_rate: f64) {
        self.recovery_coeff = time_coeff(ms, sample_rate);
    }

    #[inline(always)]
    pub fn process(&mut self, planned: f64) -> f64 {
        if planned <= self.gain {
            self.gain = planned;
        } else {
            self.gain = planned + self.recovery_coeff * (self.gain - planned);
            if planned - self.gain < UNITY_SNAP {
                self.gain = planned;
            }
        }
        self.gain
    }

    #[inline]
    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn reset(&mut self) {
        self.gain = 1.0;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGE B
// ═══════════════════════════════════════════════════════════════════════════════

/// Sustain/release shaper operating on reduction in dB
#[derive(Debug, Clone)]
pub struct SustainStage {
    fast_db: f64,
    slow_db: f64,
    attack_coeff: f64,
    fast_release_coeff: f64,
    slow_charge_coeff: f64,
    slow_release_coeff: f64,
    release_curve: f64,
    anti_pump: f64,
}

impl SustainStage {
    pub fn new() -> Self {
        Self {
            fast_db: 0.0,
            slow_db: 0.0,
            attack_coeff: 0.0,
            fast_release_coeff: 0.0,
            slow_charge_coeff: 0.0,
            slow_release_coeff: 0.0,
            release_curve: 0.0,
            anti_pump: 0.0,
        }
    }

    /// Derive coefficients from the style and the Attack/Release parameters
    pub fn configure(
        &mut self,
        style: &StyleDescriptor,
        attack_ms: f64,
        release_ms: f64,
        sample_rate: f64,
    ) {
        self.attack_coeff = time_coeff(attack_ms, sample_rate);
        self.fast_release_coeff = time_coeff(release_ms * style.fast_release, sample_rate);
        self.slow_charge_coeff = time_coeff(style.sustain_charge_ms(), sample_rate);
        self.slow_release_coeff = time_coeff(release_ms * style.slow_release, sample_rate);
        self.release_curve = style.release_curve;
        self.anti_pump = style.anti_pump;
    }

    /// Feed Stage A's reduction; returns Stage B's reduction (dB)
    #[inline(always)]
    pub fn process(&mut self, reduction: f64) -> f64 {
        if reduction == 0.0 && self.fast_db == 0.0 && self.slow_db == 0.0 {
            return 0.0;
        }

        if reduction > self.fast_db {
            self.fast_db = reduction + self.attack_coeff * (self.fast_db - reduction);
        } else {
            // Deeper reduction releases faster
            let depth = 1.0 + self.release_curve * self.fast_db / CURVE_REFERENCE_DB;
            let step = ((1.0 - self.fast_release_coeff) * depth).min(1.0);
            self.fast_db -= (self.fast_db - reduction) * step;
        }

        let coeff = if reduction > self.slow_db {
            self.slow_charge_coeff
        } else {
            self.slow_release_coeff
        };
        self.slow_db = reduction + coeff * (self.slow_db - reduction);

        if self.fast_db < ENVELOPE_FLOOR_DB {
            self.fast_db = 0.0;
        }
        if self.slow_db < ENVELOPE_FLOOR_DB {
            self.slow_db = 0.0;
        }

        self.fast_db.max(self.anti_pump * self.slow_db)
    }

    #[inline]
    pub fn fast_db(&self) -> f64 {
        self.fast_db
    }

    #[inline]
    pub fn slow_db(&self) -> f64 {
        self.slow_db
    }

    pub fn reset(&mut self) {
        self.fast_db = 0.0;
        self.slow_db = 0.0;
    }
}

impl Default for SustainStage {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENVELOPE PHASE
// ═══════════════════════════════════════════════════════════════════════════════

/// Observable envelope behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopePhase {
    /// Unity gain, no reduction
    Idle,
    /// Gain descending
    Engaging,
    /// Gain steady below unity
    Holding,
    /// Gain ascending back towards unity
    Releasing,
}

impl Default for EnvelopePhase {
    fn default() -> Self {
        Self::Idle
    }
}

#[derive(Debug, Clone)]
struct PhaseTracker {
    last_gain: f64,
    phase: EnvelopePhase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            last_gain: 1.0,
            phase: EnvelopePhase::Idle,
        }
    }

    #[inline(always)]
    fn update(&mut self, gain: f64) {
        self.phase = if gain >= 1.0 {
            EnvelopePhase::Idle
        } else if gain < self.last_gain - PHASE_EPSILON {
            EnvelopePhase::Engaging
        } else if gain > self.last_gain + PHASE_EPSILON {
            EnvelopePhase::Releasing
        } else {
            EnvelopePhase::Holding
        };
        self.last_gain = gain;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHANNEL GAIN ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Stage A + Stage B for one channel
#[derive(Debug, Clone)]
pub struct ChannelGain {
    transient: TransientStage,
    sustain: SustainStage,
    phase: PhaseTracker,
}

impl ChannelGain {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            transient: TransientStage::new(sample_rate),
            sustain: SustainStage::new(),
            phase: PhaseTracker::new(),
        }
    }

    /// Per-block reconfiguration; state is untouched
    pub fn configure(
        &mut self,
        style: &StyleDescriptor,
        attack_ms: f64,
        release_ms: f64,
        sample_rate: f64,
    ) {
        self.transient.set_recovery(style.transient_ms, sample_rate);
        self.sustain.configure(style, attack_ms, release_ms, sample_rate);
    }

    /// Planned gain in, applied gain out
    #[inline(always)]
    pub fn process(&mut self, planned: Sample) -> Sample {
        let a = self.transient.process(planned);
        let b = db_to_gain_fast(self.sustain.process(reduction_db(a)));
        let gain = a.min(b);
        self.phase.update(gain);
        gain
    }

    #[inline]
    pub fn phase(&self) -> EnvelopePhase {
        self.phase.phase
    }

    pub fn reset(&mut self) {
        self.transient.reset();
        self.sustain.reset();
        self.phase = PhaseTracker::new();
    }
}
