//! CLI argument parsing using clap derive

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use schema_model::{ExcludeMode, parse_duration};

/// Schema Reconciler - Reload and reconcile connection schema configuration
#[derive(Parser, Debug)]
#[command(name = "schemactl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine configuration file (.toml, .json, .yaml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Remote API root, overrides `base_url` from the configuration file
    #[arg(long, global = true, env = "SCHEMACTL_BASE_URL")]
    pub base_url: Option<String>,

    /// Value of the Authorization header sent with every request
    #[arg(long, global = true, env = "SCHEMACTL_AUTHORIZATION", hide_env_values = true)]
    pub authorization: Option<String>,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Re-discover a connection's schemas
    ///
    /// Examples:
    ///   schemactl reload -c conn_1
    ///   schemactl reload -c conn_1 --exclude-mode exclude --timeout 45m
    Reload {
        /// Connection identifier
        #[arg(short, long)]
        connection: String,

        /// How newly discovered tables and columns are treated
        #[arg(long, default_value = "PRESERVE", value_parser = parse_exclude_mode)]
        exclude_mode: ExcludeMode,

        /// Reload budget, at most 1h (e.g. 90s, 20m)
        #[arg(long, value_parser = parse_timeout)]
        timeout: Option<Duration>,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Show the remote schema configuration of a connection
    Show {
        /// Connection identifier
        #[arg(short, long)]
        connection: String,

        /// Show the columns of one table instead
        #[arg(long, value_name = "SCHEMA.TABLE")]
        table: Option<String>,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Reconcile a connection with a desired configuration file
    ///
    /// Reloads the schema, then applies schema, table and column settings in
    /// that order. Exits non-zero when any node fails or is skipped.
    Apply {
        /// Desired configuration file (.toml, .json, .yaml)
        file: PathBuf,

        /// Reload budget, at most 1h (e.g. 90s, 20m)
        #[arg(long, value_parser = parse_timeout)]
        timeout: Option<Duration>,

        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

fn parse_exclude_mode(value: &str) -> Result<ExcludeMode, String> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_defaults() {
        let cli = Cli::try_parse_from(["schemactl", "reload", "-c", "conn_1"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Reload {
                connection: "conn_1".to_string(),
                exclude_mode: ExcludeMode::Preserve,
                timeout: None,
                json: false,
            }
        );
    }

    #[test]
    fn test_reload_parses_timeout_and_mode() {
        let cli = Cli::try_parse_from([
            "schemactl",
            "reload",
            "--connection",
            "conn_1",
            "--exclude-mode",
            "exclude",
            "--timeout",
            "1h30m",
        ])
        .unwrap();
        match cli.command {
            Commands::Reload {
                exclude_mode,
                timeout,
                ..
            } => {
                assert_eq!(exclude_mode, ExcludeMode::Exclude);
                assert_eq!(timeout, Some(Duration::from_secs(90 * 60)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_timeout_is_rejected() {
        assert!(Cli::try_parse_from(["schemactl", "reload", "-c", "c", "--timeout", "soon"]).is_err());
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "schemactl",
            "show",
            "-c",
            "conn_1",
            "--base-url",
            "https://api.example.com",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.base_url.as_deref(), Some("https://api.example.com"));
    }
}
