//! Error types for PeakForge

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum PfError {
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(f64),

    #[error("Invalid block size: {0}")]
    InvalidBlockSize(usize),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),
}

/// Result type alias
pub type PfResult<T> = Result<T, PfError>;
