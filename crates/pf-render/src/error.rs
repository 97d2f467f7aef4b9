//! Error types for offline rendering

use pf_core::PfError;
use thiserror::Error;

/// Offline rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to read audio file: {0}")]
    ReadError(String),

    #[error("Failed to write output file: {0}")]
    WriteError(String),

    #[error("Unsupported channel count: {0} (mono or stereo only)")]
    UnsupportedChannels(u16),

    #[error("Unsupported output bit depth: {0}")]
    UnsupportedBitDepth(u16),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Limiter error: {0}")]
    Limiter(#[from] PfError),
}

/// Result type for rendering
pub type RenderResult<T> = Result<T, RenderError>;
