//! Dither for bit-depth reduction
//!
//! TPDF dither, optionally with first-order error-feedback noise shaping.
//! Off is an exact passthrough.

use pf_core::Sample;
use serde::{Deserialize, Serialize};

/// Target bit depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DitherBits {
    Off,
    Bits8,
    Bits12,
    Bits16,
    Bits24,
}

impl DitherBits {
    pub const ALL: [Self; 5] = [Self::Off, Self::Bits8, Self::Bits12, Self::Bits16, Self::Bits24];

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Bit depth, `None` when off
    pub fn bits(self) -> Option<u32> {
        match self {
            Self::Off => None,
            Self::Bits8 => Some(8),
            Self::Bits12 => Some(12),
            Self::Bits16 => Some(16),
            Self::Bits24 => Some(24),
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Off),
            8 => Some(Self::Bits8),
            12 => Some(Self::Bits12),
            16 => Some(Self::Bits16),
            24 => Some(Self::Bits24),
            _ => None,
        }
    }
}

impl Default for DitherBits {
    fn default() -> Self {
        Self::Off
    }
}

/// Dither noise shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DitherShape {
    /// Triangular PDF, flat spectrum
    Tpdf,
    /// TPDF with first-order error feedback (noise pushed towards high frequencies)
    NoiseShaped,
}

impl Default for DitherShape {
    fn default() -> Self {
        Self::Tpdf
    }
}

/// Single-channel dither processor.
///
/// Runs after the ceiling stage, so at low bit depths the output may exceed
/// the ceiling by up to about 1.5 LSB (about 0.1 dB at 8 bits).
#[derive(Debug, Clone)]
pub struct Dither {
    bits: DitherBits,
    shape: DitherShape,
    /// Quantization step (1 LSB at target depth)
    quant_step: f64,
    /// Previous quantization error (for noise shaping)
    error: f64,
    noise: NoiseSource,
}

/// xorshift64* generator, reseeded on reset so renders are repeatable
#[derive(Debug, Clone)]
struct NoiseSource {
    state: u64,
    seed: u64,
}

impl NoiseSource {
    fn new(seed: u64) -> Self {
        let seed = seed.max(1);
        Self { state: seed, seed }
    }

    fn rewind(&mut self) {
        self.state = self.seed;
    }

    /// Uniform in [-1, 1]
    #[inline(always)]
    fn bipolar(&mut self) -> f64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D) as i64 as f64 / i64::MAX as f64
    }

    /// Triangular PDF spanning +-1 LSB when scaled by half a step
    #[inline(always)]
    fn triangular(&mut self) -> f64 {
        self.bipolar() + self.bipolar()
    }
}

impl Dither {
    pub fn new(shape: DitherShape, seed: u64) -> Self {
        Self {
            bits: DitherBits::Off,
            shape,
            quant_step: 0.0,
            error: 0.0,
            noise: NoiseSource::new(seed),
        }
    }

    pub fn set_bits(&mut self, bits: DitherBits) {
        if bits == self.bits {
            return;
        }
        self.bits = bits;
        // Quantization step = 2 / (2^bits)
        self.quant_step = match bits.bits() {
            Some(b) => 2.0 / (1u64 << b) as f64,
            None => 0.0,
        };
        self.error = 0.0;
    }

    #[inline]
    pub fn bits(&self) -> DitherBits {
        self.bits
    }

    #[inline]
    pub fn quant_step(&self) -> f64 {
        self.quant_step
    }

    #[inline(always)]
    fn quantize(&mut self, input: Sample) -> Sample {
        let step = self.quant_step;
        let target = match self.shape {
            DitherShape::Tpdf => input,
            DitherShape::NoiseShaped => input - self.error,
        };
        let noisy = target + 0.5 * step * self.noise.triangular();
        let level = (noisy / step).round() * step;
        self.error = level - target;
        level.clamp(-1.0, 1.0 - step)
    }

    /// Dither a block in place; a no-op when off
    pub fn process_block(&mut self, buffer: &mut [Sample]) {
        if self.bits == DitherBits::Off {
            return;
        }
        for sample in buffer.iter_mut() {
            *sample = self.quantize(*sample);
        }
    }

    pub fn reset(&mut self) {
        self.error = 0.0;
        self.noise.rewind();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise_floor_db(bits: DitherBits, shape: DitherShape) -> f64 {
        let mut dither = Dither::new(shape, 0x853c49e6748fea9b);
        dither.set_bits(bits);
        let mut buffer = vec![0.0; 200_000];
        dither.process_block(&mut buffer);
        let rms = (buffer.iter().map(|x| x * x).sum::<f64>() / buffer.len() as f64).sqrt();
        20.0 * rms.log10()
    }

    #[test]
    fn test_off_is_bit_exact() {
        let mut dither = Dither::new(DitherShape::Tpdf, 1);
        let input: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.013).sin() * 0.7).collect();
        let mut buffer = input.clone();
        dither.process_block(&mut buffer);
        assert_eq!(buffer, input);
    }

    #[test]
    fn test_noise_floor_16_bit() {
        let db = noise_floor_db(DitherBits::Bits16, DitherShape::Tpdf);
        assert!((db - -96.3).abs() < 1.0, "{db:.2} dBFS");
    }

    #[test]
    fn test_noise_floor_24_bit() {
        let db = noise_floor_db(DitherBits::Bits24, DitherShape::Tpdf);
        assert!((db - -144.5).abs() < 1.0, "{db:.2} dBFS");
    }

    #[test]
    fn test_output_on_grid() {
        let mut dither = Dither::new(DitherShape::NoiseShaped, 7);
        dither.set_bits(DitherBits::Bits8);
        let step = dither.quant_step();
        let mut buffer: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.02).sin() * 0.5).collect();
        dither.process_block(&mut buffer);
        for x in buffer {
            let steps = x / step;
            assert!((steps - steps.round()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_overshoot_at_most_one_and_a_half_steps() {
        let mut dither = Dither::new(DitherShape::Tpdf, 3);
        dither.set_bits(DitherBits::Bits8);
        let step = dither.quant_step();
        let ceiling = pf_core::db_to_gain(-0.3);
        let mut buffer = vec![ceiling; 50_000];
        dither.process_block(&mut buffer);

        let peak = buffer.iter().fold(0.0f64, |acc, x| acc.max(x.abs()));
        assert!(peak > ceiling);
        assert!(peak <= ceiling + 1.5 * step + 1e-12);
    }

    #[test]
    fn test_noise_shaping_is_louder_but_bounded() {
        let flat = noise_floor_db(DitherBits::Bits16, DitherShape::Tpdf);
        let shaped = noise_floor_db(DitherBits::Bits16, DitherShape::NoiseShaped);
        assert!(shaped > flat);
        assert!(shaped < flat + 6.0);
    }

    #[test]
    fn test_reset_repeats_noise() {
        let mut dither = Dither::new(DitherShape::NoiseShaped, 42);
        dither.set_bits(DitherBits::Bits16);
        let input: Vec<f64> = (0..512).map(|i| (i as f64 * 0.05).sin() * 0.3).collect();

        let mut first = input.clone();
        dither.process_block(&mut first);
        dither.reset();
        let mut second = input.clone();
        dither.process_block(&mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn test_bits_mapping() {
        assert_eq!(DitherBits::from_index(3).bits(), Some(16));
        assert_eq!(DitherBits::from_index(0).bits(), None);
        assert_eq!(DitherBits::from_bits(24), Some(DitherBits::Bits24));
        assert_eq!(DitherBits::from_bits(20), None);
    }
}
