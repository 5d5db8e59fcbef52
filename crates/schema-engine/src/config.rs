//! Engine configuration
//!
//! Every field has a production default, so an empty file (or no file at
//! all) is a valid configuration. Durations are written as text such as
//! `"250ms"`, `"30s"` or `"1h30m"`.

use std::path::Path;
use std::time::Duration;

use schema_model::ConfigStore;
use schema_model::duration::serde_text;
use serde::{Deserialize, Serialize};

use crate::classify::MarkerClassifier;
use crate::invoke::{MAX_INVOKE_TIMEOUT, validate_timeout};
use crate::poll::Poller;
use crate::reconcile::DEFAULT_INVOKE_TIMEOUT;
use crate::retry::{BackoffConfig, BackoffPolicy};
use crate::{Error, Result};

/// Default budget for a whole reconcile run.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Remote API root, e.g. `https://api.example.com`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(with = "serde_text")]
    pub invoke_timeout: Duration,

    #[serde(with = "serde_text")]
    pub operation_timeout: Duration,

    #[serde(with = "serde_text")]
    pub poll_interval: Duration,

    pub backoff: BackoffConfig,

    pub conflict: MarkerClassifier,

    /// Schema branches applied concurrently
    pub parallelism: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            poll_interval: Poller::DEFAULT_INTERVAL,
            backoff: BackoffConfig::default(),
            conflict: MarkerClassifier::default(),
            parallelism: 1,
        }
    }
}

impl EngineConfig {
    /// Load from a `.toml`, `.json`, `.yaml` or `.yml` file and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = ConfigStore::new().load(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_timeout(self.invoke_timeout, MAX_INVOKE_TIMEOUT)?;
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig {
                message: "poll_interval must be greater than zero".to_string(),
            });
        }
        if self.parallelism == 0 {
            return Err(Error::InvalidConfig {
                message: "parallelism must be at least 1".to_string(),
            });
        }
        if self.conflict.statuses.is_empty() {
            return Err(Error::InvalidConfig {
                message: "conflict.statuses must list at least one status".to_string(),
            });
        }
        Ok(())
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        self.backoff.into()
    }
}
