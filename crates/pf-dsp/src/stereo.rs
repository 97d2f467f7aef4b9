//! Stereo linking and Mid/Side coding

use pf_core::{MidSideSample, Sample, StereoSample};

/// Couples the two channel gains by a link amount
#[derive(Debug, Clone, Copy)]
pub struct StereoLinker {
    link: f64,
}

impl StereoLinker {
    pub fn new() -> Self {
        Self { link: 1.0 }
    }

    /// Link amount in percent (0-100)
    pub fn set_link_percent(&mut self, percent: f64) {
        self.link = (percent / 100.0).clamp(0.0, 1.0);
    }

    #[inline]
    pub fn link(&self) -> f64 {
        self.link
    }

    /// `lerp(own, tightest, link)` on linear gain for each channel.
    ///
    /// At full link both channels get exactly the tighter gain.
    #[inline(always)]
    pub fn apply(&self, gain_a: f64, gain_b: f64) -> (f64, f64) {
        let tightest = gain_a.min(gain_b);
        let own = 1.0 - self.link;
        (
            gain_a * own + tightest * self.link,
            gain_b * own + tightest * self.link,
        )
    }
}

impl Default for StereoLinker {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a stereo block in place: left becomes mid, right becomes side
pub fn encode_mid_side(left: &mut [Sample], right: &mut [Sample]) {
    for (l, r) in left.iter_mut().zip(right.iter_mut()) {
        let ms = StereoSample::new(*l, *r).to_mid_side();
        *l = ms.mid;
        *r = ms.side;
    }
}

/// Decode a mid/side block in place back to left/right
pub fn decode_mid_side(mid: &mut [Sample], side: &mut [Sample]) {
    for (m, s) in mid.iter_mut().zip(side.iter_mut()) {
        let lr = MidSideSample::new(*m, *s).to_stereo();
        *m = lr.left;
        *s = lr.right;
    }
}
