//! Dry path latency compensation
//!
//! The dry signal is delayed by the same amount the wet path reports so the
//! Mix control blends time-aligned material.

use pf_core::Sample;

/// Fixed-capacity ring; the delay can move anywhere in `0..=capacity`
/// without reallocating or losing history.
#[derive(Debug, Clone)]
pub struct DelayLine {
    ring: Vec<Sample>,
    head: usize,
    delay: usize,
}

impl DelayLine {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: vec![0.0; capacity + 1],
            head: 0,
            delay: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.len() - 1
    }

    /// Clamped to the capacity
    pub fn set_delay(&mut self, samples: usize) {
        self.delay = samples.min(self.capacity());
    }

    #[inline]
    pub fn delay(&self) -> usize {
        self.delay
    }

    #[inline]
    pub fn push(&mut self, input: Sample) -> Sample {
        let len = self.ring.len();
        self.ring[self.head] = input;
        let tap = if self.head >= self.delay {
            self.head - self.delay
        } else {
            self.head + len - self.delay
        };
        self.head = if self.head + 1 == len { 0 } else { self.head + 1 };
        self.ring[tap]
    }

    /// Delay `input` into `output`
    pub fn process(&mut self, input: &[Sample], output: &mut [Sample]) {
        for (x, y) in input.iter().zip(output.iter_mut()) {
            *y = self.push(*x);
        }
    }

    pub fn clear(&mut self) {
        self.ring.fill(0.0);
        self.head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let mut line = DelayLine::new(16);
        line.set_delay(3);
        let input: Vec<f64> = (1..=8).map(|i| i as f64).collect();
        let mut output = vec![0.0; 8];
        line.process(&input, &mut output);
        assert_eq!(output, vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_zero_delay_passthrough() {
        let mut line = DelayLine::new(4);
        assert_eq!(line.push(0.5), 0.5);
    }

    #[test]
    fn test_delay_clamped_to_capacity() {
        let mut line = DelayLine::new(10);
        line.set_delay(100);
        assert_eq!(line.delay(), 10);

        let out: Vec<f64> = (0..12).map(|i| line.push(i as f64 + 1.0)).collect();
        assert_eq!(out[10], 1.0);
        assert_eq!(out[11], 2.0);
    }

    #[test]
    fn test_delay_change_keeps_history() {
        let mut line = DelayLine::new(8);
        line.set_delay(2);
        for i in 0..8 {
            line.push(i as f64);
        }
        line.set_delay(5);
        // Written at delay 2, still readable at delay 5
        assert_eq!(line.push(8.0), 3.0);
    }
}
