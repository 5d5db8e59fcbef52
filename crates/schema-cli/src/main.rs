//! Schema Reconciler CLI
//!
//! Reloads a connection's schema, shows what the remote reports, and
//! reconciles it with a desired configuration file.

mod cli;
mod commands;
mod context;
mod error;
mod logging;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use context::Context;
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;
    tracing::debug!("Verbose mode enabled");

    let context = Context::from_cli(&cli)?;
    execute_command(&context, cli.command)
}

fn execute_command(context: &Context, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Reload {
            connection,
            exclude_mode,
            timeout,
            json,
        } => commands::run_reload(context, &connection, exclude_mode, timeout, json),
        Commands::Show {
            connection,
            table,
            json,
        } => commands::run_show(context, &connection, table.as_deref(), json),
        Commands::Apply {
            file,
            timeout,
            json,
        } => commands::run_apply(context, &file, timeout, json),
    }
}
