//! PeakForge offline renderer
//!
//! Usage:
//!   pf-render in.wav out.wav
//!   pf-render in.wav out.wav --config master.json --ceiling -1 --oversampling 8

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use pf_dsp::LimiterStyle;
use pf_render::{RenderConfig, render_file};

#[derive(Parser)]
#[command(name = "pf-render", about = "Render a WAV file through the PeakForge true-peak limiter")]
struct Cli {
    /// Input WAV file (mono or stereo)
    input: PathBuf,

    /// Output WAV file
    output: PathBuf,

    /// JSON render config; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ceiling (dBTP)
    #[arg(long, allow_hyphen_values = true)]
    ceiling: Option<f64>,

    /// Threshold (dB); lower values drive harder into the limiter
    #[arg(long, allow_hyphen_values = true)]
    threshold: Option<f64>,

    /// Input trim (dB)
    #[arg(long, allow_hyphen_values = true)]
    trim: Option<f64>,

    /// Limiter style (Transparent, Punchy, Dynamic, Aggressive, Bus, Safe, Modern, Allround)
    #[arg(short, long)]
    style: Option<String>,

    /// Oversampling ratio (1, 2, 4, 8, 16, 32)
    #[arg(short, long)]
    oversampling: Option<usize>,

    /// Lookahead (ms)
    #[arg(long)]
    lookahead: Option<f64>,

    /// Release (ms)
    #[arg(long)]
    release: Option<f64>,

    /// Dither to this many bits (0 = off)
    #[arg(long)]
    dither: Option<u32>,

    /// Output bit depth (16, 24 or 32 float)
    #[arg(short, long)]
    bits: Option<u16>,

    /// Print the render report as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn render_config(&self) -> Result<RenderConfig> {
        let mut config = match &self.config {
            Some(path) => RenderConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => RenderConfig::default(),
        };

        if let Some(v) = self.ceiling {
            config.ceiling_db = v;
        }
        if let Some(v) = self.threshold {
            config.threshold_db = v;
        }
        if let Some(v) = self.trim {
            config.input_trim_db = v;
        }
        if let Some(name) = &self.style {
            config.style = match LimiterStyle::from_name(name) {
                Some(style) => style,
                None => bail!("Unknown style '{}'", name),
            };
        }
        if let Some(v) = self.oversampling {
            config.oversampling = v;
        }
        if let Some(v) = self.lookahead {
            config.lookahead_ms = v;
        }
        if let Some(v) = self.release {
            config.release_ms = v;
        }
        if let Some(v) = self.dither {
            config.dither_bits = v;
        }
        if let Some(v) = self.bits {
            config.output_bits = v;
        }

        config.validate().context("Invalid render settings")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.render_config()?;

    let report = render_file(&cli.input, &cli.output, &config)
        .with_context(|| format!("Failed to render {}", cli.input.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
