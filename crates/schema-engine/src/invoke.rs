//! Schema reload with transport-timeout fallback to polling
//!
//! A reload can legitimately run for minutes, longer than an HTTP call is
//! willing to wait. When the POST times out in the transport the remote may
//! still be working, so instead of failing, the invoker polls the schema
//! read endpoint until the rediscovered schema becomes visible.
//!
//! ```text
//! Invoking --Completed---------> Done
//! Invoking --TransportTimedOut-> Polling --SchemaVisible--> Done
//! Invoking/Polling --DeadlinePassed--> DeadlineExceeded
//! ```

use std::time::Duration;

use schema_model::{ExcludeMode, ReloadRequest, SchemaSnapshot};
use serde::Serialize;
use tracing::{info, warn};

use crate::client::ApiClient;
use crate::deadline::Deadline;
use crate::poll::Poller;
use crate::{Error, Result};

/// The longest action timeout the remote accepts.
pub const MAX_INVOKE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Reject `timeout` if it exceeds `max`.
///
/// # Errors
///
/// Returns [`Error::InvalidTimeout`]; no remote call is involved.
pub fn validate_timeout(timeout: Duration, max: Duration) -> Result<()> {
    if timeout > max {
        return Err(Error::InvalidTimeout {
            requested: timeout,
            max,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPhase {
    Invoking,
    Polling,
    Done,
    DeadlineExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadEvent {
    /// The reload call itself returned a successful response
    Completed,
    /// The reload call got no response within its timeout
    TransportTimedOut,
    /// A poll read satisfied the visibility predicate
    SchemaVisible,
    DeadlinePassed,
}

impl ReloadPhase {
    /// The phase `event` leads to, or `None` if it is not valid here.
    pub fn on(self, event: ReloadEvent) -> Option<ReloadPhase> {
        use ReloadEvent as E;
        match (self, event) {
            (Self::Invoking, E::Completed) => Some(Self::Done),
            (Self::Invoking, E::TransportTimedOut) => Some(Self::Polling),
            (Self::Polling, E::SchemaVisible) => Some(Self::Done),
            (Self::Invoking | Self::Polling, E::DeadlinePassed) => Some(Self::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::DeadlineExceeded)
    }
}

/// Tracks the current phase and every phase visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadMachine {
    trail: Vec<ReloadPhase>,
}

impl Default for ReloadMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadMachine {
    pub fn new() -> Self {
        Self {
            trail: vec![ReloadPhase::Invoking],
        }
    }

    pub fn phase(&self) -> ReloadPhase {
        self.trail
            .last()
            .copied()
            .unwrap_or(ReloadPhase::Invoking)
    }

    pub fn trail(&self) -> &[ReloadPhase] {
        &self.trail
    }

    /// Apply `event`. Returns false, leaving the phase unchanged, if the
    /// transition is not valid from the current phase.
    pub fn fire(&mut self, event: ReloadEvent) -> bool {
        match self.phase().on(event) {
            Some(next) => {
                self.trail.push(next);
                true
            }
            None => {
                warn!(phase = ?self.phase(), ?event, "Ignoring invalid reload transition");
                false
            }
        }
    }
}

/// Result of a completed reload.
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadOutcome {
    pub exclude_mode: ExcludeMode,
    /// The schema as last seen: from the reload response, or from the poll that found it.
    pub snapshot: SchemaSnapshot,
    /// Whether the transport timed out and the result came from polling
    pub polled: bool,
    pub polls: u32,
    pub trail: Vec<ReloadPhase>,
    pub elapsed: Duration,
}

impl ReloadOutcome {
    pub fn summary(&self) -> ReloadSummary {
        ReloadSummary {
            exclude_mode: self.exclude_mode,
            polled: self.polled,
            polls: self.polls,
            phases: self.trail.clone(),
            elapsed_ms: u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
            schemas: self.snapshot.schemas.len(),
        }
    }
}

/// Serializable view of a [`ReloadOutcome`] for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    pub exclude_mode: ExcludeMode,
    pub polled: bool,
    pub polls: u32,
    pub phases: Vec<ReloadPhase>,
    pub elapsed_ms: u64,
    pub schemas: usize,
}

/// Runs the reload action under a caller-supplied timeout.
#[derive(Debug, Clone)]
pub struct ActionInvoker {
    client: ApiClient,
    poller: Poller,
    max_timeout: Duration,
}

impl ActionInvoker {
    pub fn new(client: ApiClient, poller: Poller) -> Self {
        Self {
            client,
            poller,
            max_timeout: MAX_INVOKE_TIMEOUT,
        }
    }

    pub fn with_max_timeout(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = max_timeout;
        self
    }

    pub fn max_timeout(&self) -> Duration {
        self.max_timeout
    }

    /// Reload the connection's schema, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTimeout`] if `timeout` exceeds the maximum, before any call
    /// - [`Error::ConnectionNotFound`] if the remote does not know the connection
    /// - [`Error::DeadlineExceeded`] if the schema did not become visible in time
    /// - [`Error::RemoteActionFailed`] for any other failed call
    pub fn invoke(&self, request: &ReloadRequest, timeout: Duration) -> Result<ReloadOutcome> {
        validate_timeout(timeout, self.max_timeout)?;
        self.run(request, &Deadline::after(timeout))
    }

    /// Like [`invoke`](Self::invoke) with an already validated deadline.
    pub(crate) fn run(&self, request: &ReloadRequest, deadline: &Deadline) -> Result<ReloadOutcome> {
        let connection_id = request.connection_id();
        let mut machine = ReloadMachine::new();
        info!(connection_id, exclude_mode = %request.exclude_mode(), "Reloading schema");

        if deadline.is_expired() {
            machine.fire(ReloadEvent::DeadlinePassed);
            return Err(deadline.exceeded("reload", None));
        }

        let (snapshot, polls) = match self.client.reload(request, deadline.remaining()) {
            Ok(snapshot) => {
                machine.fire(ReloadEvent::Completed);
                (snapshot, 0)
            }
            Err(Error::TransportTimeout { message, .. }) => {
                machine.fire(ReloadEvent::TransportTimedOut);
                info!(connection_id, %message, "Reload call timed out, polling for the schema");
                let polled = self.poller.poll_until(
                    "reload",
                    deadline,
                    |timeout| self.client.read_schemas(connection_id, timeout),
                    |snapshot| !snapshot.is_empty(),
                );
                match polled {
                    Ok(polled) => {
                        machine.fire(ReloadEvent::SchemaVisible);
                        (polled.value, polled.polls)
                    }
                    Err(err) => {
                        if matches!(err, Error::DeadlineExceeded { .. }) {
                            machine.fire(ReloadEvent::DeadlinePassed);
                        }
                        warn!(connection_id, error = %err, "Reload did not complete");
                        return Err(err);
                    }
                }
            }
            Err(err) => {
                warn!(connection_id, error = %err, "Reload failed");
                return Err(err);
            }
        };

        info!(
            connection_id,
            schemas = snapshot.schemas.len(),
            polls,
            "Reload finished"
        );
        Ok(ReloadOutcome {
            exclude_mode: request.exclude_mode(),
            snapshot,
            polled: polls > 0,
            polls,
            trail: machine.trail().to_vec(),
            elapsed: deadline.elapsed(),
        })
    }
}
