//! Recognising "schema is changing, try again" responses
//!
//! The remote does not document a single signature for concurrent schema
//! mutation, so the decision is behind [`ConflictClassifier`]. The default
//! [`MarkerClassifier`] matches a set of statuses plus error-code markers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `{code, message}` pair the remote puts in error bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteError {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl RemoteError {
    /// Parse an error body. Bodies that are not JSON objects yield an empty
    /// code and keep the raw text as the message.
    pub fn parse(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => {
                let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
                Self {
                    code: text("code"),
                    message: text("message").or_else(|| text("error")),
                }
            }
            _ => {
                let raw = String::from_utf8_lossy(body).trim().to_string();
                Self {
                    code: None,
                    message: (!raw.is_empty()).then_some(raw),
                }
            }
        }
    }

    /// Human readable summary, falling back to `fallback` for empty bodies.
    pub fn describe(&self, fallback: &str) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => fallback.to_string(),
        }
    }

    fn mentions(&self, marker: &str) -> bool {
        let marker = marker.to_ascii_lowercase();
        [&self.code, &self.message]
            .into_iter()
            .flatten()
            .any(|text| text.to_ascii_lowercase().contains(&marker))
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe("no error details"))
    }
}

/// Decides whether a failed write was rejected because of a concurrent
/// schema change.
pub trait ConflictClassifier: Send + Sync + fmt::Debug {
    fn is_conflict(&self, status: u16, error: &RemoteError) -> bool;
}

/// Conflict when the status is listed and, if any markers are configured,
/// the error code or message contains one of them (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerClassifier {
    pub statuses: Vec<u16>,
    pub markers: Vec<String>,
}

impl Default for MarkerClassifier {
    fn default() -> Self {
        Self {
            statuses: vec![409],
            markers: vec![
                "ConcurrentModification".to_string(),
                "SchemaChangeInProgress".to_string(),
                "ReloadInProgress".to_string(),
            ],
        }
    }
}

impl ConflictClassifier for MarkerClassifier {
    fn is_conflict(&self, status: u16, error: &RemoteError) -> bool {
        if !self.statuses.contains(&status) {
            return false;
        }
        self.markers.is_empty() || self.markers.iter().any(|m| error.mentions(m))
    }
}
