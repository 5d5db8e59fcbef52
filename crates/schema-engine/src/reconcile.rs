//! Hierarchical reconciliation of a desired tree
//!
//! A run reloads the connection's schema, converges connection-wide
//! settings, then walks each schema branch parent first: the schema node,
//! then each table node, then that table's column nodes. A failed node
//! marks everything beneath it as skipped; siblings carry on.
//!
//! Branches for different schemas are independent and may run on scoped
//! threads when `parallelism > 1`. Writes within one branch are always
//! sequential, so a scope never sees two writes in flight.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use schema_model::{
    ColumnSnapshot, ConfigNode, DesiredTree, Level, ReloadRequest, SchemaSnapshot, Scope,
    validate_nodes,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::apply::{Applied, Applier, Desired, Known, Snapshot};
use crate::client::ApiClient;
use crate::deadline::Deadline;
use crate::invoke::{ActionInvoker, validate_timeout};
use crate::report::{NodeReport, Outcome, ReconcileReport, TableColumns};
use crate::{Error, Result};

/// Default wall-clock budget for the reload step of a run.
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(20 * 60);

#[derive(Debug, Default)]
struct TableBranch<'a> {
    node: Option<&'a ConfigNode>,
    columns: Vec<&'a ConfigNode>,
}

#[derive(Debug, Default)]
struct SchemaBranch<'a> {
    node: Option<&'a ConfigNode>,
    tables: BTreeMap<&'a str, TableBranch<'a>>,
}

impl<'a> SchemaBranch<'a> {
    /// Nodes of this branch in application order.
    fn nodes(&self) -> impl Iterator<Item = &'a ConfigNode> + '_ {
        self.node.into_iter().chain(
            self.tables
                .values()
                .flat_map(|t| t.node.into_iter().chain(t.columns.iter().copied())),
        )
    }
}

/// Group nodes by schema and table. Parents absent from the tree count as satisfied.
fn branches(nodes: &[ConfigNode]) -> BTreeMap<&str, SchemaBranch<'_>> {
    let mut branches: BTreeMap<&str, SchemaBranch<'_>> = BTreeMap::new();
    for node in nodes {
        let branch = branches.entry(node.schema_name()).or_default();
        match node {
            ConfigNode::SchemaLevel { .. } => branch.node = Some(node),
            ConfigNode::TableLevel { table, .. } => {
                branch.tables.entry(table.as_str()).or_default().node = Some(node);
            }
            ConfigNode::ColumnLevel { table, .. } => {
                branch.tables.entry(table.as_str()).or_default().columns.push(node);
            }
        }
    }
    branches
}

/// A schema snapshot and when it was received.
#[derive(Debug, Clone)]
struct Latest {
    snapshot: SchemaSnapshot,
    at: Instant,
}

impl Latest {
    fn new(snapshot: SchemaSnapshot) -> Self {
        Self {
            snapshot,
            at: Instant::now(),
        }
    }

    fn newer(self, other: Option<Latest>) -> Self {
        match other {
            Some(other) if other.at >= self.at => other,
            _ => self,
        }
    }
}

#[derive(Debug, Default)]
struct BranchResult {
    entries: Vec<NodeReport>,
    snapshot: Option<Latest>,
    columns: Vec<TableColumns>,
}

fn succeeded(level: Level, scope: Scope, applied: &Applied) -> NodeReport {
    NodeReport {
        level,
        scope,
        outcome: Outcome::Success,
        attempts: applied.attempts,
        changed: applied.changed,
    }
}

fn failed(level: Level, scope: Scope, err: &Error, attempts: u32) -> NodeReport {
    NodeReport {
        level,
        scope,
        outcome: Outcome::Failed {
            kind: err.kind(),
            reason: err.to_string(),
        },
        attempts,
        changed: false,
    }
}

fn skip<'a>(nodes: impl Iterator<Item = &'a ConfigNode>, blocked_by: &Scope) -> Vec<NodeReport> {
    nodes
        .map(|node| NodeReport::skipped(node.level(), node.scope(), blocked_by.clone()))
        .collect()
}

/// Drives a desired tree onto the remote.
#[derive(Debug, Clone)]
pub struct Reconciler {
    client: ApiClient,
    invoker: ActionInvoker,
    applier: Applier,
    invoke_timeout: Duration,
    parallelism: usize,
}

impl Reconciler {
    pub fn new(client: ApiClient, invoker: ActionInvoker, applier: Applier) -> Self {
        Self {
            client,
            invoker,
            applier,
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            parallelism: 1,
        }
    }

    /// Budget for the reload step, checked against the invoker's maximum on each run.
    pub fn with_invoke_timeout(mut self, invoke_timeout: Duration) -> Self {
        self.invoke_timeout = invoke_timeout;
        self
    }

    /// How many schema branches may be applied at once. Zero is treated as one.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Reload `connection_id` and converge it on `tree` within `deadline`.
    ///
    /// Node-level failures do not fail the run; they are reported per node.
    ///
    /// # Errors
    ///
    /// Fails without any remote call if the tree is invalid or the invoke
    /// timeout exceeds the maximum. Otherwise fails only if the reload fails.
    pub fn reconcile(
        &self,
        connection_id: &str,
        tree: &DesiredTree,
        deadline: Deadline,
    ) -> Result<ReconcileReport> {
        validate_nodes(&tree.nodes)?;
        validate_timeout(self.invoke_timeout, self.invoker.max_timeout())?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, connection_id, nodes = tree.nodes.len(), "Reconciling");

        let request = ReloadRequest::new(connection_id).with_exclude_mode(tree.exclude_mode);
        let reload = self
            .invoker
            .run(&request, &deadline.capped(self.invoke_timeout))?;

        let mut latest = Latest::new(reload.snapshot.clone());
        if !reload.polled && reload.snapshot.is_empty() && !tree.nodes.is_empty() {
            debug!(connection_id, "Reload returned no schemas, reading them");
            latest = Latest::new(self.read_schemas(connection_id, &deadline)?);
        }

        let branches = branches(&tree.nodes);
        let mut entries = Vec::with_capacity(tree.nodes.len() + 1);
        let mut columns = Vec::new();

        let handled = match tree.schema_change_handling {
            Some(handling) => {
                let desired = Desired::Handling(handling);
                let known = Known {
                    schemas: &latest.snapshot,
                    columns: None,
                };
                let (result, state) = self
                    .applier
                    .apply_with_state(connection_id, desired, known, &deadline);
                match result {
                    Ok(applied) => {
                        entries.push(succeeded(Level::Connection, Scope::connection(), &applied));
                        if let (true, Snapshot::Schemas(next)) = (applied.changed, applied.snapshot) {
                            latest = Latest::new(next);
                        }
                        true
                    }
                    Err(err) => {
                        warn!(connection_id, error = %err, "Schema change handling failed, skipping tree");
                        entries.push(failed(Level::Connection, Scope::connection(), &err, state.attempts));
                        false
                    }
                }
            }
            None => true,
        };

        if handled {
            let pending: Vec<(&str, &SchemaBranch<'_>)> =
                branches.iter().map(|(name, branch)| (*name, branch)).collect();
            for chunk in pending.chunks(self.parallelism) {
                for result in self.run_chunk(connection_id, chunk, &latest.snapshot, deadline) {
                    entries.extend(result.entries);
                    columns.extend(result.columns);
                    latest = latest.newer(result.snapshot);
                }
            }
        } else {
            let blocked_by = Scope::connection();
            for branch in branches.values() {
                entries.extend(skip(branch.nodes(), &blocked_by));
            }
        }

        let report = ReconcileReport {
            run_id,
            connection_id: connection_id.to_string(),
            started_at,
            finished_at: Utc::now(),
            reload: reload.summary(),
            entries,
            snapshot: latest.snapshot,
            columns,
        };
        info!(
            %run_id,
            connection_id,
            failed = report.failed().count(),
            skipped = report.skipped().count(),
            "Reconcile finished"
        );
        Ok(report)
    }

    fn run_chunk(
        &self,
        connection_id: &str,
        chunk: &[(&str, &SchemaBranch<'_>)],
        base: &SchemaSnapshot,
        deadline: Deadline,
    ) -> Vec<BranchResult> {
        if let [(name, branch)] = chunk {
            return vec![self.run_schema(connection_id, name, branch, base, deadline)];
        }
        std::thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|(name, branch)| {
                    scope.spawn(move || self.run_schema(connection_id, name, branch, base, deadline))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }

    fn run_schema(
        &self,
        connection_id: &str,
        name: &str,
        branch: &SchemaBranch<'_>,
        base: &SchemaSnapshot,
        deadline: Deadline,
    ) -> BranchResult {
        let mut result = BranchResult::default();
        let mut snapshot = base.clone();

        if let Some(node) = branch.node {
            let known = Known {
                schemas: &snapshot,
                columns: None,
            };
            let (outcome, state) =
                self.applier
                    .apply_with_state(connection_id, Desired::Node(node), known, &deadline);
            match outcome {
                Ok(applied) => {
                    result.entries.push(succeeded(Level::Schema, node.scope(), &applied));
                    if let (true, Snapshot::Schemas(next)) = (applied.changed, applied.snapshot) {
                        snapshot = next;
                        result.snapshot = Some(Latest::new(snapshot.clone()));
                    }
                }
                Err(err) => {
                    result
                        .entries
                        .push(failed(Level::Schema, node.scope(), &err, state.attempts));
                    let blocked_by = Scope::schema(name);
                    result.entries.extend(skip(branch.nodes().skip(1), &blocked_by));
                    return result;
                }
            }
        }

        for (table, table_branch) in &branch.tables {
            if let Some(node) = table_branch.node {
                let known = Known {
                    schemas: &snapshot,
                    columns: None,
                };
                let (outcome, state) =
                    self.applier
                        .apply_with_state(connection_id, Desired::Node(node), known, &deadline);
                match outcome {
                    Ok(applied) => {
                        result.entries.push(succeeded(Level::Table, node.scope(), &applied));
                        if let (true, Snapshot::Schemas(next)) = (applied.changed, applied.snapshot) {
                            snapshot = next;
                            result.snapshot = Some(Latest::new(snapshot.clone()));
                        }
                    }
                    Err(err) => {
                        result
                            .entries
                            .push(failed(Level::Table, node.scope(), &err, state.attempts));
                        let blocked_by = Scope::table(name, *table);
                        result
                            .entries
                            .extend(skip(table_branch.columns.iter().copied(), &blocked_by));
                        continue;
                    }
                }
            }

            if !table_branch.columns.is_empty() {
                let columns =
                    self.run_columns(connection_id, name, table, table_branch, &snapshot, deadline, &mut result);
                if let Some(columns) = columns {
                    result.columns.push(TableColumns {
                        schema: name.to_string(),
                        table: table.to_string(),
                        columns,
                    });
                }
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn run_columns(
        &self,
        connection_id: &str,
        schema: &str,
        table: &str,
        branch: &TableBranch<'_>,
        snapshot: &SchemaSnapshot,
        deadline: Deadline,
        result: &mut BranchResult,
    ) -> Option<ColumnSnapshot> {
        let mut columns = match self.read_columns(connection_id, schema, table, &deadline) {
            Ok(columns) => columns,
            Err(err) => {
                warn!(connection_id, schema, table, error = %err, "Could not read columns");
                for node in &branch.columns {
                    result.entries.push(failed(Level::Column, node.scope(), &err, 0));
                }
                return None;
            }
        };

        for node in &branch.columns {
            let known = Known {
                schemas: snapshot,
                columns: Some(&columns),
            };
            let (outcome, state) =
                self.applier
                    .apply_with_state(connection_id, Desired::Node(node), known, &deadline);
            match outcome {
                Ok(applied) => {
                    result.entries.push(succeeded(Level::Column, node.scope(), &applied));
                    if let (true, Snapshot::Columns(next)) = (applied.changed, applied.snapshot) {
                        columns.columns.extend(next.columns);
                    }
                }
                Err(err) => {
                    result
                        .entries
                        .push(failed(Level::Column, node.scope(), &err, state.attempts));
                }
            }
        }
        Some(columns)
    }

    fn read_schemas(&self, connection_id: &str, deadline: &Deadline) -> Result<SchemaSnapshot> {
        if deadline.is_expired() {
            return Err(deadline.exceeded("read schemas", None));
        }
        self.client.read_schemas(connection_id, deadline.remaining())
    }

    fn read_columns(
        &self,
        connection_id: &str,
        schema: &str,
        table: &str,
        deadline: &Deadline,
    ) -> Result<ColumnSnapshot> {
        if deadline.is_expired() {
            return Err(deadline.exceeded(format!("read columns of {schema}.{table}"), None));
        }
        self.client
            .read_columns(connection_id, schema, table, deadline.remaining())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_model::{ColumnDesired, SchemaDesired, TableDesired};

    #[test]
    fn test_branches_group_by_schema_and_table() {
        let nodes = vec![
            ConfigNode::column("public", "users", "email", ColumnDesired::default()),
            ConfigNode::schema("public", SchemaDesired::default()),
            ConfigNode::table("analytics", "events", TableDesired::default()),
            ConfigNode::table("public", "users", TableDesired::default()),
        ];
        let branches = branches(&nodes);

        assert_eq!(branches.keys().copied().collect::<Vec<_>>(), vec!["analytics", "public"]);
        let public = &branches["public"];
        assert!(public.node.is_some());
        assert_eq!(public.tables["users"].columns.len(), 1);
        assert!(branches["analytics"].node.is_none());

        let order: Vec<Level> = public.nodes().map(ConfigNode::level).collect();
        assert_eq!(order, vec![Level::Schema, Level::Table, Level::Column]);
    }

    #[test]
    fn test_newer_snapshot_wins() {
        let old = Latest::new(SchemaSnapshot::default());
        let mut fresh_snapshot = SchemaSnapshot::default();
        fresh_snapshot.schemas.insert("s".into(), Default::default());
        let fresh = Latest::new(fresh_snapshot.clone());

        assert_eq!(old.clone().newer(Some(fresh)).snapshot, fresh_snapshot);
        assert!(old.newer(None).snapshot.is_empty());
    }
}
