//! Error types for schema-model

use std::path::PathBuf;

/// Result type for schema-model operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing or validating configuration data
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A remote payload did not match the expected shape
    #[error("Invalid {what} payload: {message}")]
    InvalidPayload { what: &'static str, message: String },

    /// A desired configuration tree failed local validation
    #[error("Invalid configuration tree: {message}")]
    InvalidTree { message: String },

    /// A duration string could not be parsed
    #[error("Invalid duration '{input}': expected forms like 250ms, 90s, 20m, 2h or 1h30m")]
    InvalidDuration { input: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config at {path}: {message}")]
    ConfigParse {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Unsupported config format: {extension}")]
    UnsupportedFormat { extension: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn payload(what: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            what,
            message: message.into(),
        }
    }

    pub(crate) fn tree(message: impl Into<String>) -> Self {
        Self::InvalidTree {
            message: message.into(),
        }
    }
}
