//! WAV in, limiter, WAV out
//!
//! The limiter runs with its latency compensated: the input is padded with
//! `latency` samples of silence and the same number of samples is dropped
//! from the head of the output, so output sample `n` lines up with input
//! sample `n`.

use std::path::Path;

use pf_dsp::{OversampleFactor, TruePeakDetector, TruePeakLimiter};
use serde::Serialize;

use crate::config::RenderConfig;
use crate::error::{RenderError, RenderResult};

/// Oversampling of the report's true-peak measurement
const REPORT_TRUE_PEAK_FACTOR: OversampleFactor = OversampleFactor::X4;

// ═══════════════════════════════════════════════════════════════════════════════
// AUDIO BUFFER
// ═══════════════════════════════════════════════════════════════════════════════

/// Decoded audio as a channel pair; mono files carry the same data in both
#[derive(Debug, Clone, PartialEq)]
pub struct StereoBuffer {
    pub sample_rate: u32,
    /// Channel count of the source (1 or 2)
    pub channels: u16,
    pub left: Vec<f64>,
    pub right: Vec<f64>,
}

impl StereoBuffer {
    pub fn stereo(sample_rate: u32, left: Vec<f64>, right: Vec<f64>) -> Self {
        Self {
            sample_rate,
            channels: 2,
            left,
            right,
        }
    }

    pub fn mono(sample_rate: u32, samples: Vec<f64>) -> Self {
        Self {
            sample_rate,
            channels: 1,
            right: samples.clone(),
            left: samples,
        }
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.left.len().min(self.right.len())
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Summary of one render
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderReport {
    pub frames: usize,
    pub sample_rate: u32,
    pub channels: u16,
    /// Compensated limiter latency (samples)
    pub latency_samples: usize,
    pub input_true_peak_db: f64,
    pub output_true_peak_db: f64,
    pub max_gain_reduction_db: f64,
    pub faults: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// WAV I/O
// ═══════════════════════════════════════════════════════════════════════════════

/// Read a mono or stereo WAV file (integer or float)
pub fn read_wav(path: &Path) -> RenderResult<StereoBuffer> {
    let path_str = path.display().to_string();
    let reader = hound::WavReader::open(path)
        .map_err(|e| RenderError::ReadError(format!("{}: {}", path_str, e)))?;

    let spec = reader.spec();
    if spec.channels == 0 || spec.channels > 2 {
        return Err(RenderError::UnsupportedChannels(spec.channels));
    }

    let samples: Vec<f64> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| v as f64))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RenderError::ReadError(format!("{}: {}", path_str, e)))?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| RenderError::ReadError(format!("{}: {}", path_str, e)))?
        }
    };

    log::debug!(
        "Read {}: {} ch, {} Hz, {} bit {:?}",
        path_str,
        spec.channels,
        spec.sample_rate,
        spec.bits_per_sample,
        spec.sample_format
    );

    if spec.channels == 1 {
        return Ok(StereoBuffer::mono(spec.sample_rate, samples));
    }

    let frames = samples.len() / 2;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in samples.chunks_exact(2) {
        left.push(frame[0]);
        right.push(frame[1]);
    }
    Ok(StereoBuffer::stereo(spec.sample_rate, left, right))
}

/// Write `buffer` as 16/24-bit integer or 32-bit float WAV
pub fn write_wav(path: &Path, buffer: &StereoBuffer, bits: u16) -> RenderResult<()> {
    let spec = hound::WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: bits,
        sample_format: if bits == 32 {
            hound::SampleFormat::Float
        } else {
            hound::SampleFormat::Int
        },
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| RenderError::WriteError(format!("{}: {}", path.display(), e)))?;
    let write_err = |e: hound::Error| RenderError::WriteError(e.to_string());

    let frames = buffer.frames();
    for i in 0..frames {
        let pair = [buffer.left[i], buffer.right[i]];
        for &sample in &pair[..buffer.channels as usize] {
            match bits {
                16 => writer
                    .write_sample(to_int(sample, 16) as i16)
                    .map_err(write_err)?,
                24 => writer.write_sample(to_int(sample, 24)).map_err(write_err)?,
                32 => writer.write_sample(sample as f32).map_err(write_err)?,
                other => return Err(RenderError::UnsupportedBitDepth(other)),
            }
        }
    }

    writer.finalize().map_err(write_err)?;
    Ok(())
}

/// Scale to a signed integer of `bits`, rounding and clipping at full scale
#[inline]
fn to_int(sample: f64, bits: u32) -> i32 {
    let scale = (1i64 << (bits - 1)) as f64;
    (sample * scale).round().clamp(-scale, scale - 1.0) as i32
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER
// ═══════════════════════════════════════════════════════════════════════════════

fn true_peak_db(left: &[f64], right: &[f64]) -> f64 {
    let mut peak: f64 = 0.0;
    for channel in [left, right] {
        let mut detector = TruePeakDetector::new(REPORT_TRUE_PEAK_FACTOR);
        detector.process(channel);
        peak = peak.max(detector.finish());
    }
    pf_core::level_db(peak)
}

/// Run a buffer through a fresh limiter configured from `config`
pub fn render(input: &StereoBuffer, config: &RenderConfig) -> RenderResult<(StereoBuffer, RenderReport)> {
    config.validate()?;

    let mut limiter = TruePeakLimiter::new(config.limiter_config(input.sample_rate as f64))?;
    let handle = limiter.handle();
    config.apply(&handle);
    limiter.apply_params();

    let latency = limiter.latency_samples();
    let frames = input.frames();
    let total = frames + latency;

    let mut left = Vec::with_capacity(total);
    left.extend_from_slice(&input.left[..frames]);
    left.resize(total, 0.0);
    let mut right = Vec::with_capacity(total);
    right.extend_from_slice(&input.right[..frames]);
    right.resize(total, 0.0);

    let mut max_gr: f64 = 0.0;
    for (l, r) in left
        .chunks_mut(config.block_size)
        .zip(right.chunks_mut(config.block_size))
    {
        limiter.process_block(l, r);
        let [gr_l, gr_r] = handle.meters().gain_reduction();
        max_gr = max_gr.max(gr_l).max(gr_r);
    }

    left.drain(..latency);
    right.drain(..latency);

    let report = RenderReport {
        frames,
        sample_rate: input.sample_rate,
        channels: input.channels,
        latency_samples: latency,
        input_true_peak_db: true_peak_db(&input.left, &input.right),
        output_true_peak_db: true_peak_db(&left, &right),
        max_gain_reduction_db: max_gr,
        faults: handle.fault_count(),
    };

    let output = StereoBuffer {
        sample_rate: input.sample_rate,
        channels: input.channels,
        left,
        right,
    };
    Ok((output, report))
}

/// Read, render and write one file
pub fn render_file(input: &Path, output: &Path, config: &RenderConfig) -> RenderResult<RenderReport> {
    let source = read_wav(input)?;
    log::info!(
        "Rendering {} ({:.2} s, {} Hz, {} ch)",
        input.display(),
        source.duration_secs(),
        source.sample_rate,
        source.channels
    );

    let (rendered, report) = render(&source, config)?;
    write_wav(output, &rendered, config.output_bits)?;

    log::info!(
        "Wrote {}: true peak {:.2} -> {:.2} dBTP, max GR {:.2} dB, latency {} samples, {} faults",
        output.display(),
        report.input_true_peak_db,
        report.output_true_peak_db,
        report.max_gain_reduction_db,
        report.latency_samples,
        report.faults
    );
    if report.faults > 0 {
        log::warn!("{} block(s) contained non-finite audio and were silenced", report.faults);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, freq: f64, amplitude: f64) -> Vec<f64> {
        (0..frames)
            .map(|i| amplitude * (2.0 * std::f64::consts::PI * freq * i as f64 / 48000.0).sin())
            .collect()
    }

    #[test]
    fn test_to_int_scaling() {
        assert_eq!(to_int(0.5, 16), 16384);
        assert_eq!(to_int(1.0, 16), 32767);
        assert_eq!(to_int(-1.0, 16), -32768);
        assert_eq!(to_int(-2.0, 24), -8388608);
    }

    #[test]
    fn test_render_preserves_length_and_alignment() {
        // Below the ceiling the limiter is transparent, so the compensated
        // output lines up with the input
        let input = StereoBuffer::stereo(48000, sine(10000, 440.0, 0.25), sine(10000, 660.0, 0.25));
        let (output, report) = render(&input, &RenderConfig::default()).unwrap();

        assert_eq!(output.frames(), 10000);
        assert_eq!(report.latency_samples, 240 + OversampleFactor::X4.filter_delay());
        assert_eq!(report.max_gain_reduction_db, 0.0);
        for i in 200..9800 {
            assert!((output.left[i] - input.left[i]).abs() < 1e-3, "sample {i}");
        }
    }

    #[test]
    fn test_render_limits_true_peak() {
        let config = RenderConfig {
            threshold_db: -9.0,
            ..RenderConfig::default()
        };
        let input = StereoBuffer::mono(48000, sine(24000, 100.0, 0.9));
        let (output, report) = render(&input, &config).unwrap();

        assert_eq!(output.channels, 1);
        assert!(report.max_gain_reduction_db > 6.0);
        assert!(report.output_true_peak_db <= config.ceiling_db + 0.1);
        assert_eq!(report.faults, 0);
    }

    #[test]
    fn test_render_rejects_bad_config() {
        let input = StereoBuffer::mono(48000, vec![0.0; 16]);
        let config = RenderConfig {
            block_size: 0,
            ..RenderConfig::default()
        };
        assert!(render(&input, &config).is_err());

        let slow = StereoBuffer::mono(100, vec![0.0; 16]);
        assert!(matches!(
            render(&slow, &RenderConfig::default()),
            Err(RenderError::Limiter(_))
        ));
    }
}
