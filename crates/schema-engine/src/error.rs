//! Error types for schema-engine

use std::time::Duration;

use serde::Serialize;

/// Result type for schema-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reloading or reconciling a connection's schema
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller asked for a longer action timeout than the remote permits.
    /// Raised before any network call.
    #[error("Invalid Timeout: {requested:?} exceeds the maximum of {max:?}")]
    InvalidTimeout { requested: Duration, max: Duration },

    /// The connection does not exist on the remote
    #[error("Connection not found: {connection_id}: {message}")]
    ConnectionNotFound {
        connection_id: String,
        message: String,
    },

    /// A schema, table or column does not exist on the remote
    #[error("Not found: {resource}: {message}")]
    NotFound { resource: String, message: String },

    /// No response arrived within the call's timeout
    #[error("Transport timeout during {operation}: {message}")]
    TransportTimeout { operation: String, message: String },

    /// The remote rejected a write because the schema is changing concurrently
    #[error("Conflict on {scope}: {message}")]
    ConflictDetected { scope: String, message: String },

    /// The caller's time budget ran out before the operation finished
    #[error("Deadline exceeded during {operation} after {elapsed:?}{}", last_error_suffix(.last_error))]
    DeadlineExceeded {
        operation: String,
        elapsed: Duration,
        last_error: Option<String>,
    },

    /// Any other failed call
    #[error("Remote action failed{}: {message}", status_suffix(.status))]
    RemoteActionFailed { status: Option<u16>, message: String },

    /// Engine configuration is unusable
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // Transparent wrappers for underlying crate errors
    /// Model error from schema-model (tree validation, payload parsing, config loading)
    #[error(transparent)]
    Model(#[from] schema_model::Error),

    /// JSON serialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(message) => format!(" (last error: {message})"),
        None => String::new(),
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!(" with status {status}"),
        None => String::new(),
    }
}

/// Copyable classification of an [`Error`], used in attempt tracking and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTimeout,
    InvalidInput,
    ConnectionNotFound,
    NotFound,
    TransportTimeout,
    Conflict,
    DeadlineExceeded,
    RemoteFailure,
    InvalidResponse,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTimeout { .. } => ErrorKind::InvalidTimeout,
            Self::ConnectionNotFound { .. } => ErrorKind::ConnectionNotFound,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::TransportTimeout { .. } => ErrorKind::TransportTimeout,
            Self::ConflictDetected { .. } => ErrorKind::Conflict,
            Self::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            Self::RemoteActionFailed { .. } => ErrorKind::RemoteFailure,
            Self::Model(schema_model::Error::InvalidPayload { .. }) => ErrorKind::InvalidResponse,
            Self::InvalidConfig { .. } | Self::Model(_) | Self::Json(_) => ErrorKind::InvalidInput,
        }
    }

    /// Whether a read that failed this way is worth repeating.
    ///
    /// Timeouts, conflicts, throttling and server-side failures may clear up
    /// on their own; everything else will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransportTimeout { .. } | Self::ConflictDetected { .. } => true,
            Self::RemoteActionFailed {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::RemoteActionFailed {
            status,
            message: message.into(),
        }
    }
}
