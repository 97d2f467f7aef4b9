//! pf-core: Shared types for PeakForge
//!
//! Sample aliases, stereo/mid-side pairs, decibel helpers, lock-free
//! parameter slots and the error type used by every PeakForge crate.

mod error;
mod params;
mod sample;

pub use error::*;
pub use params::*;
pub use sample::*;

/// Level reported for silence by every meter
pub const METER_FLOOR_DB: f64 = -120.0;

/// Lowest and highest sample rates an engine may be built for
pub const MIN_SAMPLE_RATE: f64 = 8_000.0;
pub const MAX_SAMPLE_RATE: f64 = 384_000.0;

/// Channel configuration of the limiter's internal pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ChannelConfig {
    Stereo,
    DualMono,
    MidSide,
}

impl ChannelConfig {
    /// Map a rounded enum slot value
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => Self::DualMono,
            2 => Self::MidSide,
            _ => Self::Stereo,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::Stereo
    }
}

/// Decibel value wrapper
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Decibels(pub f64);

impl Decibels {
    pub const ZERO: Self = Self(0.0);
    pub const NEG_INF: Self = Self(f64::NEG_INFINITY);

    #[inline]
    pub fn from_gain(gain: f64) -> Self {
        if gain <= 0.0 {
            Self::NEG_INF
        } else {
            Self(20.0 * gain.log10())
        }
    }

    #[inline]
    pub fn to_gain(self) -> f64 {
        if self.0 <= -144.0 {
            0.0
        } else {
            10.0_f64.powf(self.0 / 20.0)
        }
    }
}

impl Default for Decibels {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Linear gain from decibels
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Decibels from linear amplitude, floored at [`METER_FLOOR_DB`]
#[inline]
pub fn level_db(amplitude: f64) -> f64 {
    if amplitude > 1e-6 {
        (20.0 * amplitude.log10()).max(METER_FLOOR_DB)
    } else {
        METER_FLOOR_DB
    }
}

/// Attenuation in positive dB for a linear gain (0 for unity or above)
#[inline]
pub fn reduction_db(gain: f64) -> f64 {
    if gain >= 1.0 {
        0.0
    } else if gain <= 1e-12 {
        240.0
    } else {
        -20.0 * gain.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_decibels_round_trip() {
        let db = Decibels::from_gain(0.5);
        assert_relative_eq!(db.0, -6.0206, epsilon = 1e-4);
        assert_relative_eq!(db.to_gain(), 0.5, epsilon = 1e-12);
        assert_eq!(Decibels::from_gain(0.0), Decibels::NEG_INF);
    }

    #[test]
    fn test_level_floor() {
        assert_eq!(level_db(0.0), METER_FLOOR_DB);
        assert_eq!(level_db(1e-9), METER_FLOOR_DB);
        assert_relative_eq!(level_db(1.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reduction_db() {
        assert_eq!(reduction_db(1.0), 0.0);
        assert_eq!(reduction_db(1.5), 0.0);
        assert_relative_eq!(reduction_db(db_to_gain(-3.0)), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_channel_config_index() {
        assert_eq!(ChannelConfig::from_index(0), ChannelConfig::Stereo);
        assert_eq!(ChannelConfig::from_index(1), ChannelConfig::DualMono);
        assert_eq!(ChannelConfig::from_index(2), ChannelConfig::MidSide);
        assert_eq!(ChannelConfig::from_index(9), ChannelConfig::Stereo);
    }
}
