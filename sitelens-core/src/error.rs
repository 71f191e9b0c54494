use sitelens_scanner::CaptureError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid risk thresholds: {0}")]
    Thresholds(String),

    #[error("Weight for {name} must be within 0..=100, got {weight}")]
    Weight { name: String, weight: u32 },

    #[error("{0} timeout must be greater than zero")]
    ZeroTimeout(&'static str),
}
