//! Ceiling / safety stage
//!
//! Last style-independent enforcement point on the oversampled signal.
//! Clamps residual excursions, measures the post-ceiling true peak and
//! reports the first non-finite sample it meets.

use pf_core::{MidSideSample, Sample};

/// Relative excursion that counts as a clamp; anything smaller is rounding
/// in the gain arithmetic and is scaled away without being counted
const CLAMP_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct CeilingStage {
    ceiling: f64,
    peaks: [f64; 2],
    clamped: u64,
}

impl CeilingStage {
    pub fn new() -> Self {
        Self {
            ceiling: 1.0,
            peaks: [0.0; 2],
            clamped: 0,
        }
    }

    /// Ceiling as linear amplitude
    #[inline]
    pub fn set_ceiling(&mut self, ceiling: f64) {
        self.ceiling = ceiling;
    }

    /// Enforce the ceiling on a channel pair.
    ///
    /// In mid/side mode the pair is scaled jointly so the decoded left/right
    /// stay under the ceiling. Returns the index of the first non-finite
    /// sample; nothing from that index on is touched.
    pub fn process(&mut self, a: &mut [Sample], b: &mut [Sample], mid_side: bool) -> Option<usize> {
        let c = self.ceiling;
        let counted = c * (1.0 + CLAMP_TOLERANCE);
        for (i, (x, y)) in a.iter_mut().zip(b.iter_mut()).enumerate() {
            if !x.is_finite() || !y.is_finite() {
                return Some(i);
            }

            if mid_side {
                // max(|m + s|, |m - s|) == |m| + |s|
                let sum = x.abs() + y.abs();
                if sum > c {
                    let k = c / sum;
                    *x *= k;
                    *y *= k;
                    if sum > counted {
                        self.clamped += 1;
                    }
                }
                let lr = MidSideSample::new(*x, *y).to_stereo();
                self.peaks[0] = self.peaks[0].max(lr.left.abs());
                self.peaks[1] = self.peaks[1].max(lr.right.abs());
            } else {
                let level = x.abs().max(y.abs());
                if level > c {
                    *x = x.clamp(-c, c);
                    *y = y.clamp(-c, c);
                    if level > counted {
                        self.clamped += 1;
                    }
                }
                self.peaks[0] = self.peaks[0].max(x.abs());
                self.peaks[1] = self.peaks[1].max(y.abs());
            }
        }
        None
    }

    /// Peaks since the last call (linear, left/right)
    pub fn take_peaks(&mut self) -> [f64; 2] {
        std::mem::take(&mut self.peaks)
    }

    /// Samples clamped by more than rounding since the last reset
    #[inline]
    pub fn clamped(&self) -> u64 {
        self.clamped
    }

    pub fn reset(&mut self) {
        self.peaks = [0.0; 2];
        self.clamped = 0;
    }
}

impl Default for CeilingStage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_clamp() {
        let mut stage = CeilingStage::new();
        stage.set_ceiling(0.5);
        let mut a = vec![0.2, 0.7, -0.9];
        let mut b = vec![0.1, -0.3, 0.4];
        assert_eq!(stage.process(&mut a, &mut b, false), None);
        assert_eq!(a, vec![0.2, 0.5, -0.5]);
        assert_eq!(b, vec![0.1, -0.3, 0.4]);
        assert_eq!(stage.take_peaks(), [0.5, 0.4]);
        assert_eq!(stage.clamped(), 2);
        assert_eq!(stage.take_peaks(), [0.0, 0.0]);
    }

    #[test]
    fn test_mid_side_joint_scaling() {
        let mut stage = CeilingStage::new();
        stage.set_ceiling(0.8);
        let mut mid = vec![0.6];
        let mut side = vec![-0.6];
        stage.process(&mut mid, &mut side, true);
        let lr = MidSideSample::new(mid[0], side[0]).to_stereo();
        assert!(lr.left.abs() <= 0.8 + 1e-15);
        assert!(lr.right.abs() <= 0.8 + 1e-15);
        let peaks = stage.take_peaks();
        assert!((peaks[0].max(peaks[1]) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_reported() {
        let mut stage = CeilingStage::new();
        let mut a = vec![0.1, 0.2, f64::NAN, 0.3];
        let mut b = vec![0.1, 0.2, 0.2, f64::INFINITY];
        assert_eq!(stage.process(&mut a, &mut b, false), Some(2));

        let mut a = vec![0.1, 0.2];
        let mut b = vec![0.1, f64::NEG_INFINITY];
        assert_eq!(stage.process(&mut a, &mut b, true), Some(1));
    }

    #[test]
    fn test_rounding_is_not_a_clamp() {
        let mut stage = CeilingStage::new();
        stage.set_ceiling(0.9);
        let mut a = vec![0.9 * (1.0 + 1e-13), 0.9 * (1.0 + 1e-6)];
        let mut b = vec![0.0, 0.0];
        stage.process(&mut a, &mut b, false);
        assert_eq!(a, vec![0.9, 0.9]);
        assert_eq!(stage.clamped(), 1);

        let mut mid = vec![0.45 * (1.0 + 1e-13)];
        let mut side = vec![0.45];
        stage.process(&mut mid, &mut side, true);
        assert!(mid[0].abs() + side[0].abs() <= 0.9 * (1.0 + 1e-15));
        assert_eq!(stage.clamped(), 1);
    }
}
