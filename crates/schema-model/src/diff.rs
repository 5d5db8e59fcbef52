//! Minimal PATCH bodies computed from desired state against a snapshot
//!
//! Only fields whose desired value differs from the snapshot, or whose
//! snapshot entry is missing, end up in a patch. An empty patch means the
//! remote already matches and no write is needed.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::node::{ColumnDesired, SchemaDesired, TableDesired};
use crate::snapshot::{ColumnState, SchemaChangeHandling, SchemaState, SyncMode, TableState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ColumnPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_primary_key: Option<bool>,
}

impl ColumnPatch {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.hashed.is_none() && self.is_primary_key.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TablePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_mode: Option<SyncMode>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub columns: BTreeMap<String, ColumnPatch>,
}

impl TablePatch {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.sync_mode.is_none() && self.columns.is_empty()
    }

    /// Body for the per-table endpoint, carrying column changes only.
    pub fn columns_only(column: impl Into<String>, patch: ColumnPatch) -> Self {
        let mut columns = BTreeMap::new();
        if !patch.is_empty() {
            columns.insert(column.into(), patch);
        }
        Self {
            columns,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tables: BTreeMap<String, TablePatch>,
}

impl SchemaPatch {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.tables.is_empty()
    }

    /// Body for the per-schema endpoint, carrying one table's changes.
    pub fn single_table(table: impl Into<String>, patch: TablePatch) -> Self {
        let mut tables = BTreeMap::new();
        if !patch.is_empty() {
            tables.insert(table.into(), patch);
        }
        Self {
            tables,
            ..Self::default()
        }
    }
}

/// Body for the connection-wide schema settings endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_change_handling: Option<SchemaChangeHandling>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub schemas: BTreeMap<String, SchemaPatch>,
}

impl SchemaSettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.schema_change_handling.is_none() && self.schemas.is_empty()
    }

    pub fn handling(desired: SchemaChangeHandling, current: Option<SchemaChangeHandling>) -> Self {
        Self {
            schema_change_handling: (current != Some(desired)).then_some(desired),
            schemas: BTreeMap::new(),
        }
    }

    pub fn single_schema(schema: impl Into<String>, patch: SchemaPatch) -> Self {
        let mut schemas = BTreeMap::new();
        if !patch.is_empty() {
            schemas.insert(schema.into(), patch);
        }
        Self {
            schema_change_handling: None,
            schemas,
        }
    }
}

fn changed(desired: Option<bool>, current: Option<bool>) -> Option<bool> {
    match (desired, current) {
        (Some(want), Some(have)) if want == have => None,
        (want, _) => want,
    }
}

impl ColumnDesired {
    pub fn diff(&self, current: Option<&ColumnState>) -> ColumnPatch {
        ColumnPatch {
            enabled: changed(self.enabled, current.map(|c| c.enabled)),
            hashed: changed(self.hashed, current.map(|c| c.hashed)),
            is_primary_key: changed(self.is_primary_key, current.map(|c| c.is_primary_key)),
        }
    }
}

impl TableDesired {
    pub fn diff(&self, current: Option<&TableState>) -> TablePatch {
        let known = current.map(|t| &t.columns);
        let column = |name: &String| known.and_then(|c| c.get(name));
        let mut columns: BTreeMap<String, ColumnPatch> = BTreeMap::new();

        for name in &self.disabled_columns {
            if let Some(value) = changed(Some(false), column(name).map(|c| c.enabled)) {
                columns.entry(name.clone()).or_default().enabled = Some(value);
            }
        }
        for name in &self.hashed_columns {
            if let Some(value) = changed(Some(true), column(name).map(|c| c.hashed)) {
                columns.entry(name.clone()).or_default().hashed = Some(value);
            }
        }
        for name in &self.pk_columns {
            if let Some(value) = changed(Some(true), column(name).map(|c| c.is_primary_key)) {
                columns.entry(name.clone()).or_default().is_primary_key = Some(value);
            }
        }

        let sync_mode = match (self.sync_mode, current.and_then(|t| t.sync_mode)) {
            (Some(want), Some(have)) if want == have && have.is_known() => None,
            (want, _) => want,
        };

        TablePatch {
            enabled: changed(self.enabled, current.map(|t| t.enabled)),
            sync_mode,
            columns,
        }
    }
}

impl SchemaDesired {
    pub fn diff(&self, current: Option<&SchemaState>) -> SchemaPatch {
        let mut tables = BTreeMap::new();
        for name in &self.disabled_tables {
            let have = current.and_then(|s| s.tables.get(name)).map(|t| t.enabled);
            if let Some(value) = changed(Some(false), have) {
                tables.insert(
                    name.clone(),
                    TablePatch {
                        enabled: Some(value),
                        ..TablePatch::default()
                    },
                );
            }
        }

        SchemaPatch {
            enabled: changed(self.enabled, current.map(|s| s.enabled)),
            tables,
        }
    }
}
