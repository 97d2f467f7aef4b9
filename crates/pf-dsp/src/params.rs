//! Lock-free parameter store
//!
//! Fourteen f64 slots identified by index. Host writes are clamped (enum
//! slots rounded), non-finite writes are dropped. The engine reads every
//! slot once per block through [`LimiterParams::snapshot`].

use pf_core::{AtomicParam, ChannelConfig, ParamRange};
use serde::{Deserialize, Serialize};

use crate::dither::DitherBits;
use crate::oversampling::OversampleFactor;
use crate::style::LimiterStyle;

pub const PARAM_COUNT: usize = 14;

/// Parameter index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    InputTrim,
    Threshold,
    Ceiling,
    Release,
    Attack,
    Lookahead,
    Style,
    Oversampling,
    StereoLink,
    MidSide,
    Mix,
    DitherBits,
    LatencyProfile,
    ChannelConfig,
}

impl ParamId {
    pub const ALL: [Self; PARAM_COUNT] = [
        Self::InputTrim,
        Self::Threshold,
        Self::Ceiling,
        Self::Release,
        Self::Attack,
        Self::Lookahead,
        Self::Style,
        Self::Oversampling,
        Self::StereoLink,
        Self::MidSide,
        Self::Mix,
        Self::DitherBits,
        Self::LatencyProfile,
        Self::ChannelConfig,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn spec(self) -> &'static ParamSpec {
        &PARAM_SPECS[self.index()]
    }

    /// Case-insensitive lookup by display name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.spec().name.eq_ignore_ascii_case(name))
    }
}

/// Static description of one parameter
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub unit: &'static str,
    pub range: ParamRange,
}

pub const PARAM_SPECS: [ParamSpec; PARAM_COUNT] = [
    ParamSpec { name: "Input Trim", unit: "dB", range: ParamRange::linear(-12.0, 12.0, 0.0) },
    ParamSpec { name: "Threshold", unit: "dB", range: ParamRange::linear(-30.0, 0.0, 0.0) },
    ParamSpec { name: "Ceiling", unit: "dBTP", range: ParamRange::linear(-3.0, 0.0, -0.3) },
    ParamSpec { name: "Release", unit: "ms", range: ParamRange::linear(1.0, 1000.0, 100.0) },
    ParamSpec { name: "Attack", unit: "ms", range: ParamRange::linear(0.01, 10.0, 0.1) },
    ParamSpec { name: "Lookahead", unit: "ms", range: ParamRange::linear(0.0, 20.0, 5.0) },
    ParamSpec { name: "Style", unit: "", range: ParamRange::enumerated(7.0, 7.0) },
    ParamSpec { name: "Oversampling", unit: "", range: ParamRange::enumerated(5.0, 1.0) },
    ParamSpec { name: "Stereo Link", unit: "%", range: ParamRange::linear(0.0, 100.0, 100.0) },
    ParamSpec { name: "Mid/Side", unit: "", range: ParamRange::toggle(0.0) },
    ParamSpec { name: "Mix", unit: "%", range: ParamRange::linear(0.0, 100.0, 100.0) },
    ParamSpec { name: "Dither Bits", unit: "", range: ParamRange::enumerated(4.0, 0.0) },
    ParamSpec { name: "Latency Profile", unit: "", range: ParamRange::enumerated(2.0, 1.0) },
    ParamSpec { name: "Channel Config", unit: "", range: ParamRange::enumerated(2.0, 0.0) },
];

// ═══════════════════════════════════════════════════════════════════════════════
// LATENCY PROFILE
// ═══════════════════════════════════════════════════════════════════════════════

/// Latency/quality trade-off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LatencyProfile {
    /// No lookahead, no oversampling, zero latency
    ZeroLatency,
    /// Lookahead 2-10 ms, oversampling 2x-4x
    HighQuality,
    /// Lookahead up to 20 ms, oversampling up to 32x; offline rendering
    OfflineMax,
}

impl LatencyProfile {
    pub const ALL: [Self; 3] = [Self::ZeroLatency, Self::HighQuality, Self::OfflineMax];

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Clamp requested lookahead (ms) and oversampling into what the profile permits
    pub fn constrain(self, lookahead_ms: f64, factor: OversampleFactor) -> (f64, OversampleFactor) {
        match self {
            Self::ZeroLatency => (0.0, OversampleFactor::X1),
            Self::HighQuality => (
                lookahead_ms.clamp(2.0, 10.0),
                factor.clamp(OversampleFactor::X2, OversampleFactor::X4),
            ),
            Self::OfflineMax => (lookahead_ms.clamp(0.0, 20.0), factor),
        }
    }
}

impl Default for LatencyProfile {
    fn default() -> Self {
        Self::HighQuality
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// The fourteen atomic parameter slots
#[derive(Debug)]
pub struct LimiterParams {
    slots: [AtomicParam; PARAM_COUNT],
}

impl LimiterParams {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|i| AtomicParam::new(PARAM_SPECS[i].range.default)),
        }
    }

    /// Clamped write; returns false when the value was dropped as non-finite
    pub fn set(&self, id: ParamId, value: f64) -> bool {
        match id.spec().range.sanitize(value) {
            Some(v) => {
                self.slots[id.index()].set(v);
                true
            }
            None => {
                log::debug!("Ignoring non-finite value for {}", id.spec().name);
                false
            }
        }
    }

    /// Write by raw index; unknown indices are ignored
    pub fn set_index(&self, index: usize, value: f64) -> bool {
        match ParamId::from_index(index) {
            Some(id) => self.set(id, value),
            None => {
                log::debug!("Ignoring write to unknown parameter index {index}");
                false
            }
        }
    }

    #[inline]
    pub fn get(&self, id: ParamId) -> f64 {
        self.slots[id.index()].get()
    }

    /// Restore every slot to its default
    pub fn reset_to_defaults(&self) {
        for (slot, spec) in self.slots.iter().zip(PARAM_SPECS.iter()) {
            slot.set(spec.range.default);
        }
    }

    /// Read every slot once
    pub fn snapshot(&self) -> ParamSnapshot {
        let index = |id: ParamId| self.get(id).round().max(0.0) as usize;
        ParamSnapshot {
            input_trim_db: self.get(ParamId::InputTrim),
            threshold_db: self.get(ParamId::Threshold),
            ceiling_db: self.get(ParamId::Ceiling),
            release_ms: self.get(ParamId::Release),
            attack_ms: self.get(ParamId::Attack),
            lookahead_ms: self.get(ParamId::Lookahead),
            style: LimiterStyle::from_index(index(ParamId::Style)),
            oversampling: OversampleFactor::from_index(index(ParamId::Oversampling)),
            stereo_link: self.get(ParamId::StereoLink),
            mid_side: self.get(ParamId::MidSide) >= 0.5,
            mix: self.get(ParamId::Mix),
            dither: DitherBits::from_index(index(ParamId::DitherBits)),
            profile: LatencyProfile::from_index(index(ParamId::LatencyProfile)),
            channel_config: ChannelConfig::from_index(index(ParamId::ChannelConfig)),
        }
    }
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed view of the parameter slots for one block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSnapshot {
    pub input_trim_db: f64,
    pub threshold_db: f64,
    pub ceiling_db: f64,
    pub release_ms: f64,
    pub attack_ms: f64,
    pub lookahead_ms: f64,
    pub style: LimiterStyle,
    pub oversampling: OversampleFactor,
    /// Percent
    pub stereo_link: f64,
    pub mid_side: bool,
    /// Percent
    pub mix: f64,
    pub dither: DitherBits,
    pub profile: LatencyProfile,
    pub channel_config: ChannelConfig,
}

impl ParamSnapshot {
    /// Mid/Side processing is on via either the toggle or the channel config
    #[inline]
    pub fn mid_side_active(&self) -> bool {
        self.mid_side || self.channel_config == ChannelConfig::MidSide
    }

    /// Link percent after channel config (dual mono never links)
    #[inline]
    pub fn effective_link(&self) -> f64 {
        if self.channel_config == ChannelConfig::DualMono {
            0.0
        } else {
            self.stereo_link
        }
    }

    /// Gain into the limiter: trim plus threshold drive
    #[inline]
    pub fn drive_db(&self) -> f64 {
        self.input_trim_db - self.threshold_db
    }
}
