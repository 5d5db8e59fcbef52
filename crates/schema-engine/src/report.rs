//! Per-node outcome report of a reconciliation run

use chrono::{DateTime, Utc};
use schema_model::{ColumnSnapshot, Level, SchemaSnapshot, Scope};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::invoke::ReloadSummary;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed { kind: ErrorKind, reason: String },
    /// Not attempted because an ancestor failed
    Skipped { blocked_by: Scope },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeReport {
    pub level: Level,
    pub scope: Scope,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub attempts: u32,
    /// Whether a write was accepted for this node
    pub changed: bool,
}

impl NodeReport {
    pub fn skipped(level: Level, scope: Scope, blocked_by: Scope) -> Self {
        Self {
            level,
            scope,
            outcome: Outcome::Skipped { blocked_by },
            attempts: 0,
            changed: false,
        }
    }
}

/// Final column state of a table that had column-level nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableColumns {
    pub schema: String,
    pub table: String,
    pub columns: ColumnSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub run_id: Uuid,
    pub connection_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reload: ReloadSummary,
    /// Parent nodes come before their children
    pub entries: Vec<NodeReport>,
    /// The most recent schema snapshot the remote returned
    pub snapshot: SchemaSnapshot,
    pub columns: Vec<TableColumns>,
}

impl ReconcileReport {
    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &NodeReport> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Failed { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &NodeReport> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Skipped { .. }))
    }

    pub fn entry(&self, scope: &Scope) -> Option<&NodeReport> {
        self.entries.iter().find(|e| &e.scope == scope)
    }

    pub fn columns_of(&self, schema: &str, table: &str) -> Option<&ColumnSnapshot> {
        self.columns
            .iter()
            .find(|c| c.schema == schema && c.table == table)
            .map(|c| &c.columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let entry = NodeReport {
            level: Level::Table,
            scope: Scope::table("public", "orders"),
            outcome: Outcome::Failed {
                kind: ErrorKind::Conflict,
                reason: "still changing".into(),
            },
            attempts: 3,
            changed: false,
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "level": "table",
                "scope": {"schema": "public", "table": "orders"},
                "status": "failed",
                "kind": "conflict",
                "reason": "still changing",
                "attempts": 3,
                "changed": false
            })
        );
    }

    #[test]
    fn test_skipped_names_blocking_scope() {
        let entry = NodeReport::skipped(
            Level::Column,
            Scope::column("s", "t", "c"),
            Scope::schema("s"),
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["status"], "skipped");
        assert_eq!(value["blocked_by"], json!({"schema": "s"}));
    }
}
