//! Desired configuration nodes
//!
//! A reconciliation run receives a flat list of [`ConfigNode`]s. Each node
//! targets exactly one scope at one level of the hierarchy.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::snapshot::{SchemaChangeHandling, SyncMode};
use crate::reload::ExcludeMode;

/// Level of the configuration hierarchy, in apply order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Connection-wide settings such as schema change handling
    Connection,
    Schema,
    Table,
    Column,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connection => "connection",
            Self::Schema => "schema",
            Self::Table => "table",
            Self::Column => "column",
        };
        write!(f, "{name}")
    }
}

/// The part of the tree a node or error refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl Scope {
    pub fn connection() -> Self {
        Self::default()
    }

    pub fn schema(schema: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            ..Self::default()
        }
    }

    pub fn table(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            table: Some(table.into()),
            column: None,
        }
    }

    pub fn column(
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            schema: Some(schema.into()),
            table: Some(table.into()),
            column: Some(column.into()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [&self.schema, &self.table, &self.column]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        if parts.is_empty() {
            write!(f, "<connection>")
        } else {
            write!(f, "{}", parts.join("."))
        }
    }
}

/// Desired state of one schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDesired {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub disabled_tables: BTreeSet<String>,
}

/// Desired state of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDesired {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "SyncMode::deserialize_known"
    )]
    pub sync_mode: Option<SyncMode>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub disabled_columns: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub hashed_columns: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub pk_columns: BTreeSet<String>,
}

/// Desired state of one column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDesired {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_primary_key: Option<bool>,
}

/// One unit of desired configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigNode {
    SchemaLevel {
        schema: String,
        desired: SchemaDesired,
    },
    TableLevel {
        schema: String,
        table: String,
        desired: TableDesired,
    },
    ColumnLevel {
        schema: String,
        table: String,
        column: String,
        desired: ColumnDesired,
    },
}

impl ConfigNode {
    pub fn schema(schema: impl Into<String>, desired: SchemaDesired) -> Self {
        Self::SchemaLevel {
            schema: schema.into(),
            desired,
        }
    }

    pub fn table(schema: impl Into<String>, table: impl Into<String>, desired: TableDesired) -> Self {
        Self::TableLevel {
            schema: schema.into(),
            table: table.into(),
            desired,
        }
    }

    pub fn column(
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        desired: ColumnDesired,
    ) -> Self {
        Self::ColumnLevel {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
            desired,
        }
    }

    pub fn level(&self) -> Level {
        match self {
            Self::SchemaLevel { .. } => Level::Schema,
            Self::TableLevel { .. } => Level::Table,
            Self::ColumnLevel { .. } => Level::Column,
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            Self::SchemaLevel { schema, .. } => Scope::schema(schema),
            Self::TableLevel { schema, table, .. } => Scope::table(schema, table),
            Self::ColumnLevel {
                schema,
                table,
                column,
                ..
            } => Scope::column(schema, table, column),
        }
    }

    pub fn schema_name(&self) -> &str {
        match self {
            Self::SchemaLevel { schema, .. }
            | Self::TableLevel { schema, .. }
            | Self::ColumnLevel { schema, .. } => schema,
        }
    }
}

/// Everything a single reconciliation run needs to know about the desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredTree {
    pub exclude_mode: ExcludeMode,
    pub schema_change_handling: Option<SchemaChangeHandling>,
    pub nodes: Vec<ConfigNode>,
}

impl DesiredTree {
    pub fn new(nodes: Vec<ConfigNode>) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    pub fn with_exclude_mode(mut self, exclude_mode: ExcludeMode) -> Self {
        self.exclude_mode = exclude_mode;
        self
    }

    pub fn with_schema_change_handling(mut self, handling: SchemaChangeHandling) -> Self {
        self.schema_change_handling = Some(handling);
        self
    }
}
