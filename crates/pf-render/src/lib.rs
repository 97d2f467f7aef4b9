//! pf-render: Offline rendering for PeakForge
//!
//! Reads a WAV file, runs it through the true-peak limiter with latency
//! compensation (default profile `OfflineMax`) and writes the result.

pub mod config;
pub mod error;
pub mod render;

pub use config::RenderConfig;
pub use error::{RenderError, RenderResult};
pub use render::{RenderReport, StereoBuffer, read_wav, render, render_file, write_wav};
