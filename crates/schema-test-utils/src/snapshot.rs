//! [`SnapshotBuilder`] for remote schema payloads.

use schema_model::{
    ColumnSnapshot, ColumnState, SchemaChangeHandling, SchemaSnapshot, SyncMode, TableState,
};
use serde_json::{Value, json};

/// Builds [`SchemaSnapshot`]s and the JSON the remote would send for them.
///
/// Schemas and tables start enabled unless stated otherwise.
///
/// ```rust
/// use schema_test_utils::SnapshotBuilder;
///
/// let snapshot = SnapshotBuilder::new()
///     .tables("public", &["orders", "products"])
///     .disabled_table("analytics", "pageviews")
///     .build();
/// assert!(snapshot.table("public", "orders").unwrap().enabled);
/// assert!(!snapshot.table("analytics", "pageviews").unwrap().enabled);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    snapshot: SchemaSnapshot,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handling(mut self, handling: SchemaChangeHandling) -> Self {
        self.snapshot.schema_change_handling = Some(handling);
        self
    }

    pub fn schema(mut self, schema: &str, enabled: bool) -> Self {
        self.snapshot.schemas.entry(schema.to_string()).or_default().enabled = enabled;
        self
    }

    /// Enabled schema holding enabled tables.
    pub fn tables(mut self, schema: &str, tables: &[&str]) -> Self {
        for table in tables {
            self = self.table(schema, table, true);
        }
        self
    }

    pub fn table(mut self, schema: &str, table: &str, enabled: bool) -> Self {
        let entry = self.snapshot.schemas.entry(schema.to_string()).or_default();
        entry.enabled = true;
        entry.tables.insert(
            table.to_string(),
            TableState {
                enabled,
                sync_mode: Some(SyncMode::SoftDelete),
                columns: Default::default(),
            },
        );
        self
    }

    pub fn disabled_table(self, schema: &str, table: &str) -> Self {
        self.table(schema, table, false)
    }

    pub fn column(mut self, schema: &str, table: &str, column: &str, state: ColumnState) -> Self {
        if self.snapshot.table(schema, table).is_none() {
            self = self.table(schema, table, true);
        }
        if let Some(entry) = self
            .snapshot
            .schemas
            .get_mut(schema)
            .and_then(|s| s.tables.get_mut(table))
        {
            entry.columns.insert(column.to_string(), state);
        }
        self
    }

    pub fn build(self) -> SchemaSnapshot {
        self.snapshot
    }

    /// The snapshot wrapped in the remote's `{"code", "data"}` envelope.
    pub fn json(&self) -> Value {
        json!({"code": "Success", "data": self.snapshot})
    }
}

/// JSON for a column read of one table.
pub fn columns_json(columns: &[(&str, ColumnState)]) -> Value {
    let snapshot = ColumnSnapshot {
        columns: columns
            .iter()
            .map(|(name, state)| (name.to_string(), *state))
            .collect(),
    };
    json!({"code": "Success", "data": snapshot})
}

/// An enabled column with no other flags.
pub fn plain_column() -> ColumnState {
    ColumnState {
        enabled: true,
        hashed: false,
        is_primary_key: false,
    }
}
