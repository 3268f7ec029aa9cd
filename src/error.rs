//! Export error taxonomy.
//!
//! Every variant is fatal to the export invocation that raised it.

use thiserror::Error;

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Export not supported by this host: {0}")]
    EnvironmentUnsupported(String),

    #[error("Chart rendering failed: {0}")]
    ChartRendering(String),

    #[error("Chart image could not be decoded: {0}")]
    ImageDecode(String),

    #[error("Canvas unavailable: {0}")]
    CanvasUnavailable(String),

    #[error("Encoding produced no data: {0}")]
    BlobEncoding(String),

    #[error("An export is already in progress")]
    ExportInProgress,

    #[error("Invalid archive name: {0}")]
    InvalidArchiveName(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
