//! Engine configuration resolution
//!
//! The configuration file is taken from `--config`, else from
//! `<config dir>/schemactl/config.toml` when that file exists, else the
//! built-in defaults are used. `--base-url` and `--authorization` are
//! applied on top.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use schema_engine::{Engine, EngineConfig};
use schema_transport::HttpTransport;
use tracing::debug;

use crate::cli::Cli;
use crate::error::{CliError, Result};

const CONFIG_DIR: &str = "schemactl";
const CONFIG_FILE: &str = "config.toml";

/// Resolved settings shared by all commands.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: EngineConfig,
    authorization: Option<String>,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let path = cli.config.clone().or_else(default_config_path);
        Self::resolve(path.as_deref(), cli.base_url.clone(), cli.authorization.clone())
    }

    pub fn resolve(
        path: Option<&Path>,
        base_url: Option<String>,
        authorization: Option<String>,
    ) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading engine configuration");
                EngineConfig::load(path)?
            }
            None => EngineConfig::default(),
        };
        if base_url.is_some() {
            config.base_url = base_url;
        }
        Ok(Self {
            config,
            authorization,
        })
    }

    /// Build an engine talking to the configured remote.
    pub fn engine(&self) -> Result<Engine> {
        let base_url = self.config.base_url.as_deref().ok_or_else(|| {
            CliError::user("No base URL configured: pass --base-url or set base_url in the config file")
        })?;

        let mut builder =
            HttpTransport::builder(base_url).default_timeout(self.config.operation_timeout);
        if let Some(authorization) = &self.authorization {
            builder = builder.authorization(authorization.clone());
        }
        Ok(Engine::new(Arc::new(builder.build()), self.config.clone()))
    }
}

fn default_config_path() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join(CONFIG_DIR).join(CONFIG_FILE);
    path.is_file().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults_without_file() {
        let context = Context::resolve(None, None, None).unwrap();
        assert_eq!(context.config, EngineConfig::default());
    }

    #[test]
    fn test_engine_requires_base_url() {
        let context = Context::resolve(None, None, None).unwrap();
        let err = context.engine().unwrap_err();
        assert!(err.to_string().contains("No base URL"));
    }

    #[test]
    fn test_flag_overrides_file_base_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "base_url = \"https://file.example.com\"\npoll_interval = \"5s\"\n",
        )
        .unwrap();

        let context =
            Context::resolve(Some(&path), Some("https://flag.example.com".to_string()), None)
                .unwrap();
        assert_eq!(context.config.base_url.as_deref(), Some("https://flag.example.com"));
        assert_eq!(context.config.poll_interval, Duration::from_secs(5));
        assert!(context.engine().is_ok());
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "parallelism = 0\n").unwrap();

        assert!(Context::resolve(Some(&path), None, None).is_err());
    }
}
