//! Conflict-retrying application of a single configuration level
//!
//! [`Applier::apply`] computes the minimal patch for one desired node against
//! the last known snapshot, sends it, and retries with [`BackoffPolicy`]
//! delays for as long as the remote reports a concurrent schema change and
//! the deadline allows. No call is made when the patch is empty.

use std::time::{Duration, Instant};

use schema_model::{
    ColumnSnapshot, ConfigNode, Level, SchemaChangeHandling, SchemaPatch, SchemaSettingsPatch,
    SchemaSnapshot, Scope, TablePatch,
};
use tracing::{debug, warn};

use crate::client::ApiClient;
use crate::deadline::Deadline;
use crate::error::ErrorKind;
use crate::retry::{BackoffPolicy, DeadlineSchedule};
use crate::{Error, Result};

/// What to converge.
#[derive(Debug, Clone, Copy)]
pub enum Desired<'a> {
    /// Connection-wide schema change handling
    Handling(SchemaChangeHandling),
    Node(&'a ConfigNode),
}

impl Desired<'_> {
    pub fn level(&self) -> Level {
        match self {
            Self::Handling(_) => Level::Connection,
            Self::Node(node) => node.level(),
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            Self::Handling(_) => Scope::connection(),
            Self::Node(node) => node.scope(),
        }
    }
}

/// The snapshots the patch is computed against.
#[derive(Debug, Clone, Copy)]
pub struct Known<'a> {
    pub schemas: &'a SchemaSnapshot,
    /// Column state of the node's table, for column-level nodes
    pub columns: Option<&'a ColumnSnapshot>,
}

/// The remote state a write returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Schemas(SchemaSnapshot),
    Columns(ColumnSnapshot),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub snapshot: Snapshot,
    /// PATCH calls sent, zero when already converged
    pub attempts: u32,
    /// The wait before each retry, in order
    pub delays: Vec<Duration>,
    pub changed: bool,
}

/// Bookkeeping for one apply. Lives only as long as that apply.
#[derive(Debug, Clone)]
pub struct AttemptState {
    pub attempts: u32,
    pub started: Instant,
    pub last_error: Option<ErrorKind>,
    pub last_message: Option<String>,
}

impl AttemptState {
    fn new() -> Self {
        Self {
            attempts: 0,
            started: Instant::now(),
            last_error: None,
            last_message: None,
        }
    }

    fn record(&mut self, err: &Error) {
        self.last_error = Some(err.kind());
        self.last_message = Some(err.to_string());
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// One PATCH request worth of changes.
#[derive(Debug, Clone)]
enum Write {
    Settings(SchemaSettingsPatch),
    Tables {
        schema: String,
        patch: SchemaPatch,
    },
    Columns {
        schema: String,
        table: String,
        patch: TablePatch,
    },
}

impl Write {
    /// The write needed to move `known` to `desired`, or `None` if it is already there.
    fn plan(desired: Desired<'_>, known: Known<'_>) -> Option<Self> {
        let write = match desired {
            Desired::Handling(handling) => Self::Settings(SchemaSettingsPatch::handling(
                handling,
                known.schemas.schema_change_handling,
            )),
            Desired::Node(ConfigNode::SchemaLevel { schema, desired }) => {
                let patch = desired.diff(known.schemas.schema(schema));
                Self::Settings(SchemaSettingsPatch::single_schema(schema, patch))
            }
            Desired::Node(ConfigNode::TableLevel {
                schema,
                table,
                desired,
            }) => Self::Tables {
                schema: schema.clone(),
                patch: SchemaPatch::single_table(table, desired.diff(known.schemas.table(schema, table))),
            },
            Desired::Node(ConfigNode::ColumnLevel {
                schema,
                table,
                column,
                desired,
            }) => {
                let current = known.columns.and_then(|c| c.column(column)).or_else(|| {
                    known
                        .schemas
                        .table(schema, table)
                        .and_then(|t| t.columns.get(column))
                });
                Self::Columns {
                    schema: schema.clone(),
                    table: table.clone(),
                    patch: TablePatch::columns_only(column, desired.diff(current)),
                }
            }
        };
        (!write.is_empty()).then_some(write)
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Settings(patch) => patch.is_empty(),
            Self::Tables { patch, .. } => patch.is_empty(),
            Self::Columns { patch, .. } => patch.is_empty(),
        }
    }
}

/// Sends configuration patches, retrying through concurrent-modification conflicts.
#[derive(Debug, Clone)]
pub struct Applier {
    client: ApiClient,
    policy: BackoffPolicy,
}

impl Applier {
    pub fn new(client: ApiClient, policy: BackoffPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// Converge one node (or the connection's change handling) on the remote.
    ///
    /// Only [`Error::ConflictDetected`] is retried. Retries continue until the
    /// deadline would pass before the next attempt; there is no attempt cap.
    ///
    /// # Errors
    ///
    /// - [`Error::DeadlineExceeded`] when the deadline runs out, with the last
    ///   conflict message attached
    /// - any other error from the write, unchanged, without retrying
    pub fn apply(
        &self,
        connection_id: &str,
        desired: Desired<'_>,
        known: Known<'_>,
        deadline: &Deadline,
    ) -> Result<Applied> {
        self.apply_with_state(connection_id, desired, known, deadline).0
    }

    /// [`apply`](Self::apply), also returning the attempt bookkeeping so
    /// failures can report how many calls were made.
    pub fn apply_with_state(
        &self,
        connection_id: &str,
        desired: Desired<'_>,
        known: Known<'_>,
        deadline: &Deadline,
    ) -> (Result<Applied>, AttemptState) {
        let scope = desired.scope();
        let Some(write) = Write::plan(desired, known) else {
            debug!(connection_id, %scope, "Already converged, nothing to send");
            let snapshot = match desired {
                Desired::Node(ConfigNode::ColumnLevel { .. }) => {
                    Snapshot::Columns(known.columns.cloned().unwrap_or_default())
                }
                _ => Snapshot::Schemas(known.schemas.clone()),
            };
            let applied = Applied {
                snapshot,
                attempts: 0,
                delays: Vec::new(),
                changed: false,
            };
            return (Ok(applied), AttemptState::new());
        };

        let operation = format!("apply {scope}");
        let mut state = AttemptState::new();
        let mut delays = Vec::new();

        let result = {
            let state = &mut state;
            let delays = &mut delays;
            let attempt = || {
                if deadline.is_expired() {
                    return Err(::backoff::Error::permanent(deadline.exceeded(
                        operation.as_str(),
                        state.last_message.clone(),
                    )));
                }
                state.attempts += 1;
                debug!(connection_id, %scope, attempt = state.attempts, "Sending patch");
                self.send(connection_id, &write, &scope, deadline.remaining())
                    .map_err(|err| {
                        state.record(&err);
                        match err {
                            Error::ConflictDetected { .. } => ::backoff::Error::transient(err),
                            other => ::backoff::Error::permanent(other),
                        }
                    })
            };
            let notify = |err: Error, wait: Duration| {
                warn!(
                    connection_id,
                    %scope,
                    delay_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Conflict, retrying"
                );
                delays.push(wait);
            };
            ::backoff::retry_notify(
                DeadlineSchedule::policy(self.policy, deadline),
                attempt,
                notify,
            )
        };

        let outcome = match result {
            Ok(snapshot) => {
                debug!(connection_id, %scope, attempts = state.attempts, "Patch applied");
                Ok(Applied {
                    snapshot,
                    attempts: state.attempts,
                    delays,
                    changed: true,
                })
            }
            Err(::backoff::Error::Transient { .. }) => {
                warn!(
                    connection_id,
                    %scope,
                    attempts = state.attempts,
                    elapsed_ms = u64::try_from(state.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Gave up on conflicting patch"
                );
                Err(deadline.exceeded(operation, state.last_message.clone()))
            }
            Err(::backoff::Error::Permanent(err)) => {
                if !matches!(err, Error::DeadlineExceeded { .. }) {
                    warn!(connection_id, %scope, error = %err, "Patch failed");
                }
                Err(err)
            }
        };
        (outcome, state)
    }

    fn send(&self, connection_id: &str, write: &Write, scope: &Scope, timeout: Duration) -> Result<Snapshot> {
        match write {
            Write::Settings(patch) => self
                .client
                .patch_settings(connection_id, patch, scope, timeout)
                .map(Snapshot::Schemas),
            Write::Tables { schema, patch } => self
                .client
                .patch_schema(connection_id, schema, patch, scope, timeout)
                .map(Snapshot::Schemas),
            Write::Columns {
                schema,
                table,
                patch,
            } => self
                .client
                .patch_table(connection_id, schema, table, patch, scope, timeout)
                .map(Snapshot::Columns),
        }
    }
}
