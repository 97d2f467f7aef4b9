//! Limiter styles
//!
//! Eight fixed control laws selected by index. A style only changes the
//! character of the gain engine; ceiling safety never depends on it.

use serde::{Deserialize, Serialize};

/// Time over which a style change morphs the active constants
pub const STYLE_MORPH_MS: f64 = 30.0;

/// Six constants that shape the two-stage gain engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleDescriptor {
    /// Stage A recovery time constant (ms)
    pub transient_ms: f64,
    /// Fast release as a multiple of the Release parameter
    pub fast_release: f64,
    /// Slow release as a multiple of the Release parameter
    pub slow_release: f64,
    /// Weight of the slow envelope against the fast one (0-1)
    pub anti_pump: f64,
    /// How much deeper reduction speeds up the fast release (0-1)
    pub release_curve: f64,
    /// How readily the slow envelope charges on sustained material (0-1)
    pub sustain_sensitivity: f64,
}

impl StyleDescriptor {
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let mix = |a: f64, b: f64| a + (b - a) * t;
        Self {
            transient_ms: mix(self.transient_ms, other.transient_ms),
            fast_release: mix(self.fast_release, other.fast_release),
            slow_release: mix(self.slow_release, other.slow_release),
            anti_pump: mix(self.anti_pump, other.anti_pump),
            release_curve: mix(self.release_curve, other.release_curve),
            sustain_sensitivity: mix(self.sustain_sensitivity, other.sustain_sensitivity),
        }
    }

    /// Slow envelope charge time (ms)
    #[inline]
    pub fn sustain_charge_ms(&self) -> f64 {
        20.0 + 480.0 * (1.0 - self.sustain_sensitivity)
    }
}

const STYLE_TABLE: [StyleDescriptor; 8] = [
    // Transparent
    StyleDescriptor {
        transient_ms: 0.08,
        fast_release: 1.0,
        slow_release: 6.0,
        anti_pump: 0.8,
        release_curve: 0.1,
        sustain_sensitivity: 0.5,
    },
    // Punchy
    StyleDescriptor {
        transient_ms: 0.05,
        fast_release: 0.5,
        slow_release: 3.0,
        anti_pump: 0.4,
        release_curve: 0.6,
        sustain_sensitivity: 0.3,
    },
    // Dynamic
    StyleDescriptor {
        transient_ms: 0.06,
        fast_release: 0.7,
        slow_release: 2.0,
        anti_pump: 0.2,
        release_curve: 0.4,
        sustain_sensitivity: 0.2,
    },
    // Aggressive
    StyleDescriptor {
        transient_ms: 0.02,
        fast_release: 0.3,
        slow_release: 1.5,
        anti_pump: 0.1,
        release_curve: 0.9,
        sustain_sensitivity: 0.6,
    },
    // Bus
    StyleDescriptor {
        transient_ms: 0.09,
        fast_release: 1.5,
        slow_release: 8.0,
        anti_pump: 0.9,
        release_curve: 0.2,
        sustain_sensitivity: 0.8,
    },
    // Safe
    StyleDescriptor {
        transient_ms: 0.1,
        fast_release: 2.0,
        slow_release: 10.0,
        anti_pump: 1.0,
        release_curve: 0.0,
        sustain_sensitivity: 0.9,
    },
    // Modern
    StyleDescriptor {
        transient_ms: 0.04,
        fast_release: 0.6,
        slow_release: 4.0,
        anti_pump: 0.6,
        release_curve: 0.5,
        sustain_sensitivity: 0.5,
    },
    // Allround
    StyleDescriptor {
        transient_ms: 0.07,
        fast_release: 0.8,
        slow_release: 5.0,
        anti_pump: 0.6,
        release_curve: 0.3,
        sustain_sensitivity: 0.5,
    },
];

/// Limiter style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimiterStyle {
    Transparent,
    Punchy,
    Dynamic,
    Aggressive,
    Bus,
    Safe,
    Modern,
    Allround,
}

impl LimiterStyle {
    pub const ALL: [Self; 8] = [
        Self::Transparent,
        Self::Punchy,
        Self::Dynamic,
        Self::Aggressive,
        Self::Bus,
        Self::Safe,
        Self::Modern,
        Self::Allround,
    ];

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn descriptor(self) -> &'static StyleDescriptor {
        &STYLE_TABLE[self.index()]
    }

    /// Case-insensitive lookup by display name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.name().eq_ignore_ascii_case(name))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Transparent => "Transparent",
            Self::Punchy => "Punchy",
            Self::Dynamic => "Dynamic",
            Self::Aggressive => "Aggressive",
            Self::Bus => "Bus",
            Self::Safe => "Safe",
            Self::Modern => "Modern",
            Self::Allround => "Allround",
        }
    }
}

impl Default for LimiterStyle {
    fn default() -> Self {
        Self::Allround
    }
}

/// Block-rate morph between style descriptors
#[derive(Debug, Clone)]
pub struct StyleMorph {
    target: LimiterStyle,
    start: StyleDescriptor,
    current: StyleDescriptor,
    elapsed: usize,
    duration: usize,
}

impl StyleMorph {
    pub fn new(style: LimiterStyle, sample_rate: f64) -> Self {
        let descriptor = *style.descriptor();
        Self {
            target: style,
            start: descriptor,
            current: descriptor,
            elapsed: 0,
            duration: ((STYLE_MORPH_MS * 0.001 * sample_rate).round() as usize).max(1),
        }
    }

    #[inline]
    pub fn target(&self) -> LimiterStyle {
        self.target
    }

    #[inline]
    pub fn current(&self) -> &StyleDescriptor {
        &self.current
    }

    #[inline]
    pub fn is_morphing(&self) -> bool {
        self.elapsed < self.duration
    }

    /// Retarget; a change mid-morph starts from the constants in effect now
    pub fn set_target(&mut self, style: LimiterStyle) {
        if style != self.target {
            self.target = style;
            self.start = self.current;
            self.elapsed = 0;
        }
    }

    /// Advance by one block and return the constants for it
    pub fn advance(&mut self, block_len: usize) -> &StyleDescriptor {
        if self.is_morphing() {
            self.elapsed = (self.elapsed + block_len).min(self.duration);
            self.current = if self.elapsed == self.duration {
                *self.target.descriptor()
            } else {
                let t = self.elapsed as f64 / self.duration as f64;
                self.start.lerp(self.target.descriptor(), t)
            };
        }
        &self.current
    }

    /// Jump straight to the target constants
    pub fn settle(&mut self) {
        self.current = *self.target.descriptor();
        self.start = self.current;
        self.elapsed = self.duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_indices() {
        for (i, style) in LimiterStyle::ALL.iter().enumerate() {
            assert_eq!(style.index(), i);
            assert_eq!(LimiterStyle::from_index(i), *style);
        }
        assert_eq!(LimiterStyle::from_index(100), LimiterStyle::Allround);
        assert_eq!(LimiterStyle::default().index(), 7);
        assert_eq!(LimiterStyle::from_name("punchy"), Some(LimiterStyle::Punchy));
        assert_eq!(LimiterStyle::from_name("Loud"), None);
    }

    #[test]
    fn test_styles_are_distinct() {
        for a in LimiterStyle::ALL {
            for b in LimiterStyle::ALL {
                if a != b {
                    assert_ne!(a.descriptor(), b.descriptor(), "{a:?} vs {b:?}");
                }
            }
        }
    }

    #[test]
    fn test_descriptor_ranges() {
        for style in LimiterStyle::ALL {
            let d = style.descriptor();
            assert!(d.transient_ms > 0.0 && d.transient_ms <= 0.1);
            assert!(d.slow_release > d.fast_release);
            for v in [d.anti_pump, d.release_curve, d.sustain_sensitivity] {
                assert!((0.0..=1.0).contains(&v));
            }
        }
        // Aggressive styles contain transients faster
        assert!(
            LimiterStyle::Aggressive.descriptor().transient_ms
                < LimiterStyle::Transparent.descriptor().transient_ms
        );
    }

    #[test]
    fn test_morph_reaches_target() {
        let mut morph = StyleMorph::new(LimiterStyle::Transparent, 48000.0);
        morph.set_target(LimiterStyle::Aggressive);

        // 30 ms at 48 kHz is 1440 samples
        let halfway = *morph.advance(720);
        let expected = LimiterStyle::Transparent
            .descriptor()
            .lerp(LimiterStyle::Aggressive.descriptor(), 0.5);
        assert!((halfway.transient_ms - expected.transient_ms).abs() < 1e-12);
        assert!(morph.is_morphing());

        morph.advance(720);
        assert!(!morph.is_morphing());
        assert_eq!(morph.current(), LimiterStyle::Aggressive.descriptor());
    }

    #[test]
    fn test_morph_retarget_midway_is_continuous() {
        let mut morph = StyleMorph::new(LimiterStyle::Safe, 48000.0);
        morph.set_target(LimiterStyle::Punchy);
        let before = *morph.advance(480);
        morph.set_target(LimiterStyle::Bus);
        // No jump until the next block advances
        assert_eq!(*morph.current(), before);
        let next = *morph.advance(64);
        assert!((next.slow_release - before.slow_release).abs() < 1.0);
    }
}
