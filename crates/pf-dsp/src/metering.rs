//! Meter snapshot shared with the host
//!
//! Seven f64 slots written once per block by the audio thread and read from
//! any other thread, plus the fault counter and the reported latency.

use pf_core::{AtomicParam, METER_FLOOR_DB};
use std::sync::atomic::{AtomicU64, Ordering};

pub const METER_COUNT: usize = 7;

/// Default gain-reduction peak-hold decay time
pub const DEFAULT_GR_HOLD_MS: f64 = 2000.0;

/// Meter index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterId {
    /// dB, positive = attenuation. With Mid/Side active both L and R show
    /// the deeper of the mid and side reductions.
    GainReductionL,
    GainReductionR,
    /// dBFS, before trim
    InputPeakL,
    InputPeakR,
    /// dBTP, after the ceiling stage
    OutputTruePeakL,
    OutputTruePeakR,
    /// dB, decays linearly to zero
    GainReductionHold,
}

impl MeterId {
    pub const ALL: [Self; METER_COUNT] = [
        Self::GainReductionL,
        Self::GainReductionR,
        Self::InputPeakL,
        Self::InputPeakR,
        Self::OutputTruePeakL,
        Self::OutputTruePeakR,
        Self::GainReductionHold,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GainReductionL => "Gain Reduction L",
            Self::GainReductionR => "Gain Reduction R",
            Self::InputPeakL => "Input Peak L",
            Self::InputPeakR => "Input Peak R",
            Self::OutputTruePeakL => "Output True Peak L",
            Self::OutputTruePeakR => "Output True Peak R",
            Self::GainReductionHold => "GR Peak Hold",
        }
    }
}

/// One block's worth of meter values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterSnapshot {
    pub values: [f64; METER_COUNT],
}

impl MeterSnapshot {
    /// Silence: no reduction, levels at the floor
    pub const fn silent() -> Self {
        Self {
            values: [0.0, 0.0, METER_FLOOR_DB, METER_FLOOR_DB, METER_FLOOR_DB, METER_FLOOR_DB, 0.0],
        }
    }

    #[inline]
    pub fn get(&self, id: MeterId) -> f64 {
        self.values[id.index()]
    }

    #[inline]
    pub fn set(&mut self, id: MeterId, value: f64) {
        self.values[id.index()] = value;
    }

    pub fn gain_reduction(&self) -> [f64; 2] {
        [self.get(MeterId::GainReductionL), self.get(MeterId::GainReductionR)]
    }

    pub fn input_peak(&self) -> [f64; 2] {
        [self.get(MeterId::InputPeakL), self.get(MeterId::InputPeakR)]
    }

    pub fn output_true_peak(&self) -> [f64; 2] {
        [self.get(MeterId::OutputTruePeakL), self.get(MeterId::OutputTruePeakR)]
    }

    pub fn gain_reduction_hold(&self) -> f64 {
        self.get(MeterId::GainReductionHold)
    }
}

impl Default for MeterSnapshot {
    fn default() -> Self {
        Self::silent()
    }
}

/// Atomic meter slots, fault counter and latency
#[derive(Debug)]
pub struct LimiterMeters {
    slots: [AtomicParam; METER_COUNT],
    faults: AtomicU64,
    latency: AtomicU64,
}

impl LimiterMeters {
    pub fn new() -> Self {
        let silent = MeterSnapshot::silent();
        Self {
            slots: std::array::from_fn(|i| AtomicParam::new(silent.values[i])),
            faults: AtomicU64::new(0),
            latency: AtomicU64::new(0),
        }
    }

    /// Audio thread: store one block's values
    pub fn publish(&self, snapshot: &MeterSnapshot) {
        for (slot, &value) in self.slots.iter().zip(snapshot.values.iter()) {
            slot.set(value);
        }
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            values: std::array::from_fn(|i| self.slots[i].get()),
        }
    }

    #[inline]
    pub fn get(&self, id: MeterId) -> f64 {
        self.slots[id.index()].get()
    }

    #[inline]
    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn fault_count(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_latency(&self, samples: usize) {
        self.latency.store(samples as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn latency(&self) -> usize {
        self.latency.load(Ordering::Relaxed) as usize
    }
}

impl Default for LimiterMeters {
    fn default() -> Self {
        Self::new()
    }
}

/// Gain-reduction peak hold.
///
/// A captured value decays linearly and reaches zero exactly `hold` after
/// its capture; anything larger than the decayed value recaptures.
#[derive(Debug, Clone)]
pub struct GrPeakHold {
    value: f64,
    slope_per_sec: f64,
    hold_secs: f64,
}

impl GrPeakHold {
    pub fn new(hold_ms: f64) -> Self {
        Self {
            value: 0.0,
            slope_per_sec: 0.0,
            hold_secs: (hold_ms * 0.001).max(1e-3),
        }
    }

    /// Advance by one block and fold in that block's reduction (dB)
    pub fn update(&mut self, block_gr_db: f64, block_secs: f64) -> f64 {
        self.value -= self.slope_per_sec * block_secs;
        if self.value < 1e-9 {
            self.value = 0.0;
        }
        if block_gr_db > self.value {
            self.value = block_gr_db;
            self.slope_per_sec = block_gr_db / self.hold_secs;
        }
        self.value
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
        self.slope_per_sec = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_publish_and_read() {
        let meters = LimiterMeters::new();
        assert_eq!(meters.snapshot(), MeterSnapshot::silent());

        let mut snap = MeterSnapshot::silent();
        snap.set(MeterId::GainReductionR, 3.5);
        snap.set(MeterId::InputPeakL, -1.0);
        meters.publish(&snap);
        assert_eq!(meters.get(MeterId::GainReductionR), 3.5);
        assert_eq!(meters.snapshot().input_peak(), [-1.0, METER_FLOOR_DB]);
    }

    #[test]
    fn test_fault_counter_and_latency() {
        let meters = LimiterMeters::new();
        meters.record_fault();
        meters.record_fault();
        assert_eq!(meters.fault_count(), 2);
        meters.set_latency(290);
        assert_eq!(meters.latency(), 290);
    }

    #[test]
    fn test_hold_decays_within_hold_time() {
        let mut hold = GrPeakHold::new(2000.0);
        let block = 0.01;
        assert_eq!(hold.update(6.0, block), 6.0);

        // No further reduction: linear fall to zero
        let mut t = 0.0;
        while hold.value() > 0.0 {
            hold.update(0.0, block);
            t += block;
            assert!(t <= 2.0 + 1e-9, "still holding after {t} s");
        }
        assert!(t > 1.9);
    }

    #[test]
    fn test_hold_recaptures_larger_values() {
        let mut hold = GrPeakHold::new(2000.0);
        hold.update(2.0, 0.01);
        for _ in 0..50 {
            hold.update(0.0, 0.01);
        }
        // Decayed to 1.5 dB; 3 dB recaptures
        assert_abs_diff_eq!(hold.value(), 1.5, epsilon = 1e-9);
        assert_eq!(hold.update(3.0, 0.01), 3.0);
        assert_abs_diff_eq!(hold.update(1.0, 0.01), 2.985, epsilon = 1e-12);
    }

    #[test]
    fn test_meter_ids() {
        for (i, id) in MeterId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
            assert_eq!(MeterId::from_index(i), Some(*id));
        }
        assert_eq!(MeterId::from_index(7), None);
    }
}
