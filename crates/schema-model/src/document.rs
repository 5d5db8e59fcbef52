//! Nested declarative documents describing a connection's desired schema config
//!
//! A document is what users write; it flattens into the [`ConfigNode`] list a
//! reconciliation run works on.
//!
//! ```
//! use schema_model::DesiredConfig;
//!
//! let config: DesiredConfig = toml::from_str(r#"
//! connection_id = "conn_1"
//!
//! [schemas.public]
//! disabled_tables = ["products"]
//!
//! [schemas.public.tables.orders]
//! hashed_columns = ["email"]
//! "#).unwrap();
//!
//! assert_eq!(config.tree().unwrap().nodes.len(), 2);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::node::{ColumnDesired, ConfigNode, DesiredTree, SchemaDesired, TableDesired};
use crate::reload::ExcludeMode;
use crate::snapshot::{SchemaChangeHandling, SyncMode};
use crate::validation::validate_nodes;
use crate::Result;

/// Desired configuration of one table plus its explicitly configured columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableEntry {
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
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub columns: BTreeMap<String, ColumnDesired>,
}

impl TableEntry {
    pub fn desired(&self) -> TableDesired {
        TableDesired {
            enabled: self.enabled,
            sync_mode: self.sync_mode,
            disabled_columns: self.disabled_columns.clone(),
            hashed_columns: self.hashed_columns.clone(),
            pk_columns: self.pk_columns.clone(),
        }
    }
}

/// Desired configuration of one schema plus its explicitly configured tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub disabled_tables: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tables: BTreeMap<String, TableEntry>,
}

impl SchemaEntry {
    pub fn desired(&self) -> SchemaDesired {
        SchemaDesired {
            enabled: self.enabled,
            disabled_tables: self.disabled_tables.clone(),
        }
    }
}

/// Desired schema configuration for one connection.
///
/// Unknown keys at any level are rejected when the document is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesiredConfig {
    pub connection_id: String,
    #[serde(default)]
    pub exclude_mode: ExcludeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_change_handling: Option<SchemaChangeHandling>,
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaEntry>,
}

impl DesiredConfig {
    /// Flatten the document into a validated [`DesiredTree`].
    ///
    /// Nodes come out parent first, in name order.
    pub fn tree(&self) -> Result<DesiredTree> {
        let mut nodes = Vec::new();
        for (schema, entry) in &self.schemas {
            nodes.push(ConfigNode::schema(schema, entry.desired()));
            for (table, table_entry) in &entry.tables {
                nodes.push(ConfigNode::table(schema, table, table_entry.desired()));
                for (column, desired) in &table_entry.columns {
                    nodes.push(ConfigNode::column(schema, table, column, *desired));
                }
            }
        }
        validate_nodes(&nodes)?;

        Ok(DesiredTree {
            exclude_mode: self.exclude_mode,
            schema_change_handling: self.schema_change_handling,
            nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Level;
    use crate::snapshot::SyncMode;
    use pretty_assertions::assert_eq;

    const DOCUMENT: &str = r#"
connection_id = "conn_1"
exclude_mode = "EXCLUDE"
schema_change_handling = "BLOCK_ALL"

[schemas.public]
enabled = true
disabled_tables = ["products"]

[schemas.public.tables.orders]
sync_mode = "HISTORY"
hashed_columns = ["email"]
pk_columns = ["id"]

[schemas.public.tables.orders.columns.notes]
enabled = false

[schemas.analytics]
disabled_tables = ["pageviews"]
"#;

    #[test]
    fn test_parse_document() {
        let config: DesiredConfig = toml::from_str(DOCUMENT).unwrap();
        assert_eq!(config.connection_id, "conn_1");
        assert_eq!(config.exclude_mode, ExcludeMode::Exclude);
        assert_eq!(config.schema_change_handling, Some(SchemaChangeHandling::BlockAll));

        let orders = &config.schemas["public"].tables["orders"];
        assert_eq!(orders.sync_mode, Some(SyncMode::History));
        assert!(orders.hashed_columns.contains("email"));
        assert_eq!(orders.columns["notes"].enabled, Some(false));
    }

    #[test]
    fn test_tree_is_parent_first() {
        let config: DesiredConfig = toml::from_str(DOCUMENT).unwrap();
        let tree = config.tree().unwrap();

        let levels: Vec<(Level, String)> = tree
            .nodes
            .iter()
            .map(|n| (n.level(), n.scope().to_string()))
            .collect();
        assert_eq!(
            levels,
            vec![
                (Level::Schema, "analytics".to_string()),
                (Level::Schema, "public".to_string()),
                (Level::Table, "public.orders".to_string()),
                (Level::Column, "public.orders.notes".to_string()),
            ]
        );
    }

    #[test]
    fn test_exclude_mode_defaults_to_preserve() {
        let config: DesiredConfig = serde_json::from_str(r#"{"connection_id": "c"}"#).unwrap();
        assert_eq!(config.exclude_mode, ExcludeMode::Preserve);
        assert!(config.tree().unwrap().nodes.is_empty());
    }

    #[test]
    fn test_invalid_document_rejected() {
        let config: DesiredConfig = toml::from_str(
            r#"
connection_id = "c"
[schemas.public.tables.users]
disabled_columns = ["ssn"]
hashed_columns = ["ssn"]
"#,
        )
        .unwrap();
        assert!(config.tree().is_err());
    }

    #[rstest::rstest]
    #[case::top_level("connection_id = \"c\"\nexclude = \"EXCLUDE\"\n", "exclude")]
    #[case::schema("connection_id = \"c\"\n[schemas.public]\ndisabled_table = [\"products\"]\n", "disabled_table")]
    #[case::table("connection_id = \"c\"\n[schemas.public.tables.orders]\nhashed_column = [\"email\"]\n", "hashed_column")]
    #[case::column("connection_id = \"c\"\n[schemas.public.tables.orders.columns.email]\nhash = true\n", "hash")]
    fn test_misspelled_key_fails_to_load(#[case] document: &str, #[case] key: &str) {
        let err = toml::from_str::<DesiredConfig>(document).unwrap_err();
        assert!(err.to_string().contains(key), "got: {err}");
    }

    #[test]
    fn test_misspelled_sync_mode_fails_to_load() {
        let err = toml::from_str::<DesiredConfig>(
            r#"
connection_id = "c"
[schemas.public.tables.orders]
sync_mode = "HISTROY"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("HISTROY"), "got: {err}");
    }

    #[test]
    fn test_known_sync_mode_loads_from_json() {
        let config: DesiredConfig = serde_json::from_str(
            r#"{"connection_id": "c", "schemas": {"s": {"tables": {"t": {"sync_mode": "LIVE"}}}}}"#,
        )
        .unwrap();
        assert_eq!(config.schemas["s"].tables["t"].sync_mode, Some(SyncMode::Live));
    }
}
