//! Schema reload requests

use serde::{Deserialize, Serialize};

/// How a reload treats tables and columns discovered for the first time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExcludeMode {
    /// Keep the connection's existing enable/disable decisions
    #[default]
    Preserve,
    /// Exclude everything that is not explicitly enabled
    Exclude,
}

impl ExcludeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preserve => "PRESERVE",
            Self::Exclude => "EXCLUDE",
        }
    }
}

impl std::fmt::Display for ExcludeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExcludeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PRESERVE" => Ok(Self::Preserve),
            "EXCLUDE" => Ok(Self::Exclude),
            other => Err(format!(
                "unknown exclude mode '{other}' (expected PRESERVE or EXCLUDE)"
            )),
        }
    }
}

/// A request to re-discover a connection's schema structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    connection_id: String,
    exclude_mode: ExcludeMode,
}

#[derive(Serialize)]
struct ReloadBody {
    exclude_mode: ExcludeMode,
}

impl ReloadRequest {
    /// Create a reload request with the default `PRESERVE` mode.
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            exclude_mode: ExcludeMode::default(),
        }
    }

    pub fn with_exclude_mode(mut self, exclude_mode: ExcludeMode) -> Self {
        self.exclude_mode = exclude_mode;
        self
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn exclude_mode(&self) -> ExcludeMode {
        self.exclude_mode
    }

    /// JSON body sent with the reload call.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!(ReloadBody {
            exclude_mode: self.exclude_mode,
        })
    }
}
