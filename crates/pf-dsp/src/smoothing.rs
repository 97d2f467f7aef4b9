//! One-pole ramps for trim, drive and mix, and the crossfade used when the
//! engine hands over between signal paths
//!
//! `value += coeff * (target - value)` per sample, with
//! `coeff = 1 - exp(-1 / (tau * fs))`, snapping onto the target once within
//! [`SETTLE_EPSILON`].

use std::f64::consts::PI;

/// Ramp time constant for host-driven gain changes
pub const GAIN_RAMP_MS: f64 = 1.5;

/// Distance at which a ramp lands on its target
pub const SETTLE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct GainRamp {
    value: f64,
    target: f64,
    coeff: f64,
    settling: bool,
}

impl GainRamp {
    pub fn new(sample_rate: f64, initial: f64) -> Self {
        Self::with_time_ms(sample_rate, initial, GAIN_RAMP_MS)
    }

    pub fn with_time_ms(sample_rate: f64, initial: f64, time_ms: f64) -> Self {
        let tau_samples = (time_ms * 0.001 * sample_rate).max(1.0);
        Self {
            value: initial,
            target: initial,
            coeff: 1.0 - (-1.0 / tau_samples).exp(),
            settling: false,
        }
    }

    #[inline]
    pub fn retarget(&mut self, target: f64) {
        if target != self.target {
            self.target = target;
            self.settling = true;
        }
    }

    /// Skip the ramp
    pub fn jump_to(&mut self, value: f64) {
        self.value = value;
        self.target = value;
        self.settling = false;
    }

    /// Land on the current target
    pub fn settle(&mut self) {
        self.jump_to(self.target);
    }

    #[inline(always)]
    pub fn tick(&mut self) -> f64 {
        if self.settling {
            self.value += self.coeff * (self.target - self.value);
            if (self.target - self.value).abs() < SETTLE_EPSILON {
                self.value = self.target;
                self.settling = false;
            }
        }
        self.value
    }

    #[inline]
    pub fn is_settling(&self) -> bool {
        self.settling
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }
}

/// Raised-cosine handover from one signal to another.
///
/// The two weights always sum to one, so a fade between two signals that
/// both respect a peak limit respects it too.
#[derive(Debug, Clone)]
pub struct Crossfade {
    length: usize,
    position: usize,
}

impl Crossfade {
    /// Idle until [`Crossfade::start`]
    pub fn new(sample_rate: f64, time_ms: f64) -> Self {
        let length = (time_ms * 0.001 * sample_rate).round().max(1.0) as usize;
        Self {
            length,
            position: length,
        }
    }

    pub fn start(&mut self) {
        self.position = 0;
    }

    /// Jump to the end; the incoming signal takes over at once
    pub fn finish(&mut self) {
        self.position = self.length;
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.position < self.length
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Weight of the incoming signal for the next sample
    #[inline(always)]
    pub fn tick(&mut self) -> f64 {
        if self.position >= self.length {
            return 1.0;
        }
        self.position += 1;
        let t = self.position as f64 / self.length as f64;
        0.5 - 0.5 * (PI * t).cos()
    }
}
