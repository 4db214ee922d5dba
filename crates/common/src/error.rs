//! Error types shared across Dreamcloud crates.

use std::path::PathBuf;

/// Top-level error type for Dreamcloud operations.
///
/// Render-pipeline failures are deliberately fine-grained: callers route on
/// the variant (fail fast, record on the job, or log and continue), and every
/// variant carries a human-readable message.
#[derive(Debug, thiserror::Error)]
pub enum DreamcloudError {
    #[error("Render engine not found: {message}")]
    EngineNotFound { message: String },

    #[error("Render engine version incompatible: {message}")]
    EngineVersionIncompatible { message: String },

    #[error("XML generation error: {message}")]
    XmlGeneration { message: String },

    #[error("XML validation error: {message}")]
    XmlValidation { message: String },

    #[error("Failed to spawn render process: {message}")]
    ProcessSpawn { message: String },

    #[error("Render process crashed: {message}")]
    ProcessCrashed { message: String },

    #[error("Render timed out: no progress within {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Render cancelled")]
    Cancelled,

    #[error("Temp file I/O error at {path}: {source}")]
    TempFileIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Project error: {message}")]
    Project { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using DreamcloudError.
pub type DreamcloudResult<T> = Result<T, DreamcloudError>;

impl DreamcloudError {
    pub fn engine_not_found(msg: impl Into<String>) -> Self {
        Self::EngineNotFound {
            message: msg.into(),
        }
    }

    pub fn engine_version(msg: impl Into<String>) -> Self {
        Self::EngineVersionIncompatible {
            message: msg.into(),
        }
    }

    pub fn xml_generation(msg: impl Into<String>) -> Self {
        Self::XmlGeneration {
            message: msg.into(),
        }
    }

    pub fn xml_validation(msg: impl Into<String>) -> Self {
        Self::XmlValidation {
            message: msg.into(),
        }
    }

    pub fn process_spawn(msg: impl Into<String>) -> Self {
        Self::ProcessSpawn {
            message: msg.into(),
        }
    }

    pub fn process_crashed(msg: impl Into<String>) -> Self {
        Self::ProcessCrashed {
            message: msg.into(),
        }
    }

    pub fn project(msg: impl Into<String>) -> Self {
        Self::Project {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn temp_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::TempFileIo {
            path: path.into(),
            source,
        }
    }

    /// Whether this error reflects user-initiated cancellation rather than a
    /// failure. Cancellation is never surfaced to callers as a render fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
