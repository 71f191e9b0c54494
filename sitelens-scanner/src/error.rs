use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Navigation to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Rendering engine error: {0}")]
    Engine(String),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

impl CaptureError {
    pub fn navigation(url: &str, reason: impl ToString) -> Self {
        CaptureError::Navigation {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CaptureError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// A single network record that could not be turned into a typed record.
/// Never propagated: the record is logged and skipped.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Malformed {kind} record ({url}): {reason}")]
pub struct MalformedSignal {
    pub kind: &'static str,
    pub url: String,
    pub reason: String,
}

impl MalformedSignal {
    pub fn new(kind: &'static str, url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Registry connection failed: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Registry lookup timed out after {0}ms")]
    Timeout(u64),

    #[error("Registry returned no usable data for {0}")]
    Empty(String),

    #[error("Invalid hostname: {0}")]
    InvalidHost(String),
}
