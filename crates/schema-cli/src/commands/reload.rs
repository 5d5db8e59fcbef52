//! Reload command implementation

use std::time::Duration;

use colored::Colorize;
use schema_engine::{Engine, MAX_INVOKE_TIMEOUT, ReloadOutcome, validate_timeout};
use schema_model::{ExcludeMode, ReloadRequest, format_duration};

use crate::context::Context;
use crate::error::Result;

/// Run the reload command
///
/// The timeout is checked before any request is made.
pub fn run_reload(
    context: &Context,
    connection: &str,
    exclude_mode: ExcludeMode,
    timeout: Option<Duration>,
    json: bool,
) -> Result<()> {
    let timeout = timeout.unwrap_or(context.config.invoke_timeout);
    validate_timeout(timeout, MAX_INVOKE_TIMEOUT)?;

    let engine = context.engine()?;
    let request = ReloadRequest::new(connection).with_exclude_mode(exclude_mode);
    let outcome = reload_with(&engine, &request, timeout)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.summary())?);
    } else {
        print_outcome(connection, &outcome);
    }
    Ok(())
}

fn reload_with(engine: &Engine, request: &ReloadRequest, timeout: Duration) -> Result<ReloadOutcome> {
    Ok(engine.reload(request, Some(timeout))?)
}

fn print_outcome(connection: &str, outcome: &ReloadOutcome) {
    println!(
        "{} schema of {} ({})",
        "Reloaded".green().bold(),
        connection.cyan(),
        outcome.exclude_mode
    );
    println!();
    println!("{}:  {}", "Schemas".dimmed(), outcome.snapshot.schemas.len());
    println!("{}:  {}", "Elapsed".dimmed(), format_duration(outcome.elapsed));
    if outcome.polled {
        println!(
            "{}:   {} after transport timeout ({} polls)",
            "Mode".dimmed(),
            "polled".yellow(),
            outcome.polls
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{CONNECTION, engine};
    use schema_engine::client::endpoints;
    use schema_test_utils::{MockTransport, Scripted, SnapshotBuilder};
    use schema_transport::Method;
    use std::sync::Arc;

    #[test]
    fn test_oversized_timeout_fails_before_engine_is_built() {
        let context = Context::resolve(None, None, None).unwrap();
        let err = run_reload(
            &context,
            CONNECTION,
            ExcludeMode::Preserve,
            Some(Duration::from_secs(2 * 60 * 60)),
            false,
        )
        .unwrap_err();

        assert!(err.to_string().starts_with("Invalid Timeout"), "got: {err}");
    }

    #[test]
    fn test_reload_with_poll_fallback() {
        let mock = Arc::new(MockTransport::new());
        mock.script(Method::Post, endpoints::reload(CONNECTION), [Scripted::timeout()]);
        mock.respond(
            Method::Get,
            endpoints::schemas(CONNECTION),
            200,
            SnapshotBuilder::new().tables("public", &["orders"]).json(),
        );

        let outcome = reload_with(
            &engine(&mock),
            &ReloadRequest::new(CONNECTION),
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(outcome.polled);
        print_outcome(CONNECTION, &outcome);
    }
}
