//! Apply command implementation

use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use schema_engine::{Engine, MAX_INVOKE_TIMEOUT, NodeReport, Outcome, ReconcileReport, validate_timeout};
use schema_model::{ConfigStore, DesiredConfig, DesiredTree, format_duration};
use tracing::info;

use crate::context::Context;
use crate::error::{CliError, Result};

/// Run the apply command
///
/// Fails when any node of the desired configuration did not converge.
pub fn run_apply(context: &Context, file: &Path, timeout: Option<Duration>, json: bool) -> Result<()> {
    let desired: DesiredConfig = ConfigStore::new().load(file)?;
    let tree = desired.tree()?;

    let timeout = timeout.unwrap_or(context.config.invoke_timeout);
    validate_timeout(timeout, MAX_INVOKE_TIMEOUT)?;

    let mut context = context.clone();
    context.config.invoke_timeout = timeout;
    let engine = context.engine()?;

    let report = apply_with(&engine, &desired.connection_id, &tree)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    check(&report)
}

fn apply_with(engine: &Engine, connection: &str, tree: &DesiredTree) -> Result<ReconcileReport> {
    info!(connection, nodes = tree.nodes.len(), "Applying desired configuration");
    Ok(engine.reconcile(connection, tree)?)
}

fn check(report: &ReconcileReport) -> Result<()> {
    let failed = report.failed().count();
    let skipped = report.skipped().count();
    if failed == 0 && skipped == 0 {
        return Ok(());
    }
    Err(CliError::user(format!(
        "{failed} node(s) failed and {skipped} skipped on {}",
        report.connection_id
    )))
}

fn print_report(report: &ReconcileReport) {
    println!(
        "{} {} (run {})",
        "Reconciled".bold(),
        report.connection_id.cyan(),
        report.run_id
    );
    let reload = &report.reload;
    let polled = if reload.polled {
        format!(", polled {} times", reload.polls)
    } else {
        String::new()
    };
    println!(
        "{}: {} schemas in {}{polled}",
        "Reload".dimmed(),
        reload.schemas,
        format_duration(Duration::from_millis(reload.elapsed_ms))
    );
    println!();

    if report.entries.is_empty() {
        println!("  {}", "Nothing to apply".dimmed());
        return;
    }
    for entry in &report.entries {
        print_entry(entry);
    }
}

fn print_entry(entry: &NodeReport) {
    let target = format!("{:<7} {}", entry.level.to_string(), entry.scope);
    match &entry.outcome {
        Outcome::Success if entry.changed => {
            println!("  {} {target} ({} attempts)", "+".green(), entry.attempts);
        }
        Outcome::Success => println!("  {} {target} {}", "=".green(), "(unchanged)".dimmed()),
        Outcome::Failed { reason, .. } => {
            println!("  {} {target}: {}", "x".red().bold(), reason.red());
        }
        Outcome::Skipped { blocked_by } => {
            println!("  {} {target} {}", "-".yellow(), format!("(blocked by {blocked_by})").dimmed());
        }
    }
}
