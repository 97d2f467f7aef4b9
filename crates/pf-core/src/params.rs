//! Parameter types for audio processors

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic f64 slot for lock-free single-writer / single-reader exchange
pub struct AtomicParam {
    bits: AtomicU64,
}

impl AtomicParam {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl std::fmt::Debug for AtomicParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicParam").field(&self.get()).finish()
    }
}

/// How a parameter's value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Continuous,
    /// Rounded to the nearest integer index
    Enum,
    /// 0 = off, 1 = on
    Toggle,
}

/// Value range of one parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub kind: ParamKind,
}

impl ParamRange {
    pub const fn linear(min: f64, max: f64, default: f64) -> Self {
        Self {
            min,
            max,
            default,
            kind: ParamKind::Continuous,
        }
    }

    pub const fn enumerated(max_index: f64, default: f64) -> Self {
        Self {
            min: 0.0,
            max: max_index,
            default,
            kind: ParamKind::Enum,
        }
    }

    pub const fn toggle(default: f64) -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            default,
            kind: ParamKind::Toggle,
        }
    }

    /// Clamp into range; enum and toggle values snap to an integer.
    /// Non-finite input yields `None`.
    pub fn sanitize(&self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }
        let clamped = value.clamp(self.min, self.max);
        Some(match self.kind {
            ParamKind::Continuous => clamped,
            ParamKind::Enum | ParamKind::Toggle => clamped.round(),
        })
    }

    /// Denormalize a 0-1 value to actual value
    pub fn denormalize(&self, normalized: f64) -> f64 {
        self.min + normalized.clamp(0.0, 1.0) * (self.max - self.min)
    }

    /// Normalize an actual value to 0-1
    pub fn normalize(&self, value: f64) -> f64 {
        let clamped = value.clamp(self.min, self.max);
        (clamped - self.min) / (self.max - self.min)
    }
}
