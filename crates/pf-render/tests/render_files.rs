//! File round trips through the offline renderer

use approx::assert_abs_diff_eq;
use pf_dsp::LimiterStyle;
use pf_render::{RenderConfig, RenderError, StereoBuffer, read_wav, render_file, write_wav};
use tempfile::TempDir;

fn program(frames: usize, amplitude: f64) -> Vec<f64> {
    (0..frames)
        .map(|i| {
            let t = i as f64 / 44100.0;
            amplitude
                * (0.7 * (2.0 * std::f64::consts::PI * 80.0 * t).sin()
                    + 0.3 * (2.0 * std::f64::consts::PI * 1200.0 * t).sin())
        })
        .collect()
}

fn write_input(dir: &TempDir, name: &str, buffer: &StereoBuffer, bits: u16) -> std::path::PathBuf {
    let path = dir.path().join(name);
    write_wav(&path, buffer, bits).unwrap();
    path
}

#[test]
fn test_float_wav_round_trip() {
    let dir = TempDir::new().unwrap();
    let buffer = StereoBuffer::stereo(44100, program(1000, 0.5), program(1000, -0.25));
    let path = write_input(&dir, "in.wav", &buffer, 32);

    let read = read_wav(&path).unwrap();
    assert_eq!(read.channels, 2);
    assert_eq!(read.sample_rate, 44100);
    assert_eq!(read.frames(), 1000);
    for i in 0..1000 {
        assert_abs_diff_eq!(read.left[i], buffer.left[i], epsilon = 1e-6);
        assert_abs_diff_eq!(read.right[i], buffer.right[i], epsilon = 1e-6);
    }
}

#[test]
fn test_render_file_stereo_24bit() {
    let dir = TempDir::new().unwrap();
    let input = write_input(
        &dir,
        "loud.wav",
        &StereoBuffer::stereo(44100, program(44100, 1.6), program(44100, 1.2)),
        32,
    );
    let output = dir.path().join("limited.wav");

    let config = RenderConfig {
        ceiling_db: -1.0,
        style: LimiterStyle::Modern,
        output_bits: 24,
        ..RenderConfig::default()
    };
    let report = render_file(&input, &output, &config).unwrap();

    assert_eq!(report.frames, 44100);
    assert!(report.input_true_peak_db > 3.0);
    assert!(report.output_true_peak_db <= -0.9, "{}", report.output_true_peak_db);
    assert!(report.max_gain_reduction_db > 3.0);

    let rendered = read_wav(&output).unwrap();
    assert_eq!(rendered.frames(), 44100);
    assert_eq!(rendered.channels, 2);
    let peak = rendered
        .left
        .iter()
        .chain(rendered.right.iter())
        .fold(0.0f64, |acc, x| acc.max(x.abs()));
    assert!(peak <= pf_core::db_to_gain(-0.9));
}

#[test]
fn test_render_file_mono_16bit_dithered() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "mono.wav", &StereoBuffer::mono(44100, program(8000, 0.3)), 24);
    let output = dir.path().join("mono_out.wav");

    let config = RenderConfig {
        dither_bits: 16,
        output_bits: 16,
        ..RenderConfig::default()
    };
    let report = render_file(&input, &output, &config).unwrap();
    assert_eq!(report.channels, 1);

    let rendered = read_wav(&output).unwrap();
    assert_eq!(rendered.channels, 1);
    assert_eq!(rendered.frames(), 8000);
}

#[test]
fn test_config_file_and_errors() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("render.json");
    std::fs::write(&config_path, r#"{ "ceiling_db": -2.0, "oversampling": 8 }"#).unwrap();

    let config = RenderConfig::load(&config_path).unwrap();
    assert_eq!(config.ceiling_db, -2.0);
    assert_eq!(config.oversampling, 8);

    std::fs::write(&config_path, r#"{ "oversampling": 5 }"#).unwrap();
    assert!(matches!(
        RenderConfig::load(&config_path),
        Err(RenderError::InvalidConfig(_))
    ));

    std::fs::write(&config_path, "not json").unwrap();
    assert!(matches!(
        RenderConfig::load(&config_path),
        Err(RenderError::ConfigParse(_))
    ));

    let saved = dir.path().join("saved.json");
    RenderConfig::default().save(&saved).unwrap();
    assert_eq!(RenderConfig::load(&saved).unwrap(), RenderConfig::default());

    let missing = dir.path().join("missing.wav");
    assert!(matches!(read_wav(&missing), Err(RenderError::ReadError(_))));
}
