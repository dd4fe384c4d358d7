use thiserror::Error;

use crate::capture::CaptureError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    /// Input that is not a metrics snapshot.
    #[error("data format error: {0}")]
    DataFormat(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
