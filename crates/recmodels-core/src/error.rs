//! Error types for the recommender model core.
//!
//! Not-found is deliberately absent from this enum for most operations: a
//! missing index entry or a not-yet-downloaded archive is reported as `None`.
//! Errors are reserved for contract violations, transfer failures surfaced by
//! the blocking resolve path, and storage problems.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Main error type for the model core.
#[derive(Debug, Error)]
pub enum ModelsError {
    // Contract violations
    #[error("Invalid argument {field}: {message}")]
    InvalidArgument { field: String, message: String },

    #[error("Invalid coordinate '{input}': {message}")]
    InvalidCoordinate { input: String, message: String },

    #[error("Invalid version: {input}")]
    InvalidVersion { input: String },

    // Resolution errors
    #[error("Model archive not found: {coordinate}")]
    NotFound { coordinate: String },

    #[error("Resolution of {coordinate} failed: {message}")]
    ResolutionFailed { coordinate: String, message: String },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("Download cancelled")]
    DownloadCancelled,

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    // Archive and model errors
    #[error("Archive error at {path:?}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("Failed to load model for {key}: {message}")]
    ModelLoad { key: String, message: String },

    #[error("Pool exhausted for {key}")]
    PoolExhausted { key: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A failure shared between several waiters of the same download.
    #[error("{0}")]
    Shared(Arc<ModelsError>),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for model core operations.
pub type Result<T> = std::result::Result<T, ModelsError>;

impl From<std::io::Error> for ModelsError {
    fn from(err: std::io::Error) -> Self {
        ModelsError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ModelsError {
    fn from(err: serde_json::Error) -> Self {
        ModelsError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for ModelsError {
    fn from(err: rusqlite::Error) -> Self {
        ModelsError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for ModelsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelsError::Timeout(std::time::Duration::from_secs(0))
        } else {
            ModelsError::Network {
                message: err.to_string(),
                cause: err.url().map(|u| u.to_string()),
            }
        }
    }
}

impl From<zip::result::ZipError> for ModelsError {
    fn from(err: zip::result::ZipError) -> Self {
        ModelsError::Archive {
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

impl ModelsError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ModelsError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create an archive error for the given file.
    pub fn archive(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ModelsError::Archive {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a contract violation on a named argument.
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        ModelsError::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelsError::Network { .. } | ModelsError::Timeout(_) => true,
            ModelsError::Shared(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    /// Check if this error means the remote simply does not have the artifact.
    pub fn is_not_found(&self) -> bool {
        match self {
            ModelsError::NotFound { .. } => true,
            ModelsError::Shared(inner) => inner.is_not_found(),
            _ => false,
        }
    }
}
