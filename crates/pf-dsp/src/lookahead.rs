//! Lookahead buffer and gain planner
//!
//! The planner turns the per-sample gain requirement `q = min(1, ceiling / |x|)`
//! into a smooth ramp that arrives before the peak does:
//! 1. Sliding minimum of `q` over `D + 1` samples (monotonic deque)
//! 2. Three cascaded boxcar averages whose spans add up to `D`
//!
//! Every output is a weighted average of window minima that all contain the
//! sample now leaving the delay tap, so the planned gain never exceeds that
//! sample's requirement. The ramp starts exactly `D` samples early.

use pf_core::Sample;

/// Gains this close to unity are treated as unity
const UNITY_SNAP: f64 = 1e-9;

/// Required gain for one sample
#[inline(always)]
pub fn required_gain(x: Sample, ceiling: f64) -> f64 {
    let level = x.abs();
    if level > ceiling {
        ceiling / level
    } else {
        1.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOOKAHEAD BUFFER
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-capacity delay ring at the oversampled rate
#[derive(Debug, Clone)]
pub struct LookaheadBuffer {
    buffer: Vec<Sample>,
    mask: usize,
    write_pos: usize,
}

impl LookaheadBuffer {
    /// Capacity holds `max_delay` of lookahead plus as much again of older
    /// signal, which is what priming a fresh path reads back
    pub fn new(max_delay: usize) -> Self {
        let capacity = (2 * max_delay + 2).next_power_of_two();
        Self {
            buffer: vec![0.0; capacity],
            mask: capacity - 1,
            write_pos: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[inline(always)]
    pub fn write(&mut self, x: Sample) {
        self.buffer[self.write_pos] = x;
        self.write_pos = (self.write_pos + 1) & self.mask;
    }

    /// Sample written `delay` writes before the newest one
    #[inline(always)]
    pub fn tap(&self, delay: usize) -> Sample {
        self.buffer[(self.write_pos.wrapping_sub(1 + delay)) & self.mask]
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SLIDING MINIMUM
// ═══════════════════════════════════════════════════════════════════════════════

/// Monotonic deque over fixed arrays
#[derive(Debug, Clone)]
struct SlidingMin {
    values: Vec<f64>,
    stamps: Vec<u64>,
    head: usize,
    len: usize,
    window: u64,
    now: u64,
}

impl SlidingMin {
    fn new(max_window: usize) -> Self {
        let capacity = max_window + 1;
        Self {
            values: vec![0.0; capacity],
            stamps: vec![0; capacity],
            head: 0,
            len: 0,
            window: 1,
            now: 0,
        }
    }

    fn configure(&mut self, window: usize) {
        self.window = window.max(1) as u64;
        self.clear();
    }

    fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
        self.now = 0;
    }

    #[inline(always)]
    fn slot(&self, i: usize) -> usize {
        let idx = self.head + i;
        if idx >= self.values.len() {
            idx - self.values.len()
        } else {
            idx
        }
    }

    #[inline(always)]
    fn push(&mut self, q: f64) -> f64 {
        while self.len > 0 {
            let back = self.slot(self.len - 1);
            if self.values[back] >= q {
                self.len -= 1;
            } else {
                break;
            }
        }
        let back = self.slot(self.len);
        self.values[back] = q;
        self.stamps[back] = self.now;
        self.len += 1;

        while self.stamps[self.head] + self.window <= self.now {
            self.head = self.slot(1);
            self.len -= 1;
        }

        self.now += 1;
        self.values[self.head]
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BOXCAR
// ═══════════════════════════════════════════════════════════════════════════════

/// Running-sum moving average, re-summed exactly on every wrap
#[derive(Debug, Clone)]
struct Boxcar {
    buffer: Vec<f64>,
    len: usize,
    pos: usize,
    sum: f64,
}

impl Boxcar {
    fn new(max_len: usize) -> Self {
        Self {
            buffer: vec![1.0; max_len.max(1)],
            len: 1,
            pos: 0,
            sum: 1.0,
        }
    }

    fn configure(&mut self, len: usize) {
        self.len = len.max(1);
        self.clear();
    }

    /// Unity history
    fn clear(&mut self) {
        self.buffer[..self.len].fill(1.0);
        self.pos = 0;
        self.sum = self.len as f64;
    }

    #[inline(always)]
    fn process(&mut self, x: f64) -> f64 {
        if self.len == 1 {
            return x;
        }
        self.sum += x - self.buffer[self.pos];
        self.buffer[self.pos] = x;
        self.pos += 1;
        if self.pos == self.len {
            self.pos = 0;
            self.sum = self.buffer[..self.len].iter().sum();
        }
        self.sum / self.len as f64
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GAIN PLANNER
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-channel lookahead gain planner
#[derive(Debug, Clone)]
pub struct GainPlanner {
    min: SlidingMin,
    smoothers: [Boxcar; 3],
    delay: usize,
    max_delay: usize,
}

impl GainPlanner {
    pub fn new(max_delay: usize) -> Self {
        let boxcar_max = max_delay / 3 + 2;
        let mut planner = Self {
            min: SlidingMin::new(max_delay + 1),
            smoothers: [
                Boxcar::new(boxcar_max),
                Boxcar::new(boxcar_max),
                Boxcar::new(boxcar_max),
            ],
            delay: 0,
            max_delay,
        };
        planner.set_delay(0);
        planner
    }

    /// Lookahead in (oversampled) samples
    #[inline]
    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Reconfigure for a new lookahead; clears the planning state
    pub fn set_delay(&mut self, delay: usize) {
        let delay = delay.min(self.max_delay);
        self.delay = delay;
        self.min.configure(delay + 1);

        let base = delay / 3;
        let extra = delay % 3;
        for (i, smoother) in self.smoothers.iter_mut().enumerate() {
            let span = base + usize::from(i < extra);
            smoother.configure(span + 1);
        }
    }

    /// Push the requirement of the newest sample; returns the gain planned
    /// for the sample `delay` writes back
    #[inline(always)]
    pub fn push(&mut self, required: f64) -> f64 {
        let mut g = self.min.push(required);
        for smoother in &mut self.smoothers {
            g = smoother.process(g);
        }
        if g >= 1.0 - UNITY_SNAP { 1.0 } else { g }
    }

    pub fn reset(&mut self) {
        self.min.clear();
        for smoother in &mut self.smoothers {
            smoother.clear();
        }
    }
}
