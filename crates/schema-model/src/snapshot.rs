//! Remote schema and column snapshots
//!
//! A snapshot is the remote's view at the moment of a read. Snapshots are
//! never merged: each read supersedes the previous one entirely.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Error, Result};

/// Connection-wide policy for newly discovered schemas, tables and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaChangeHandling {
    AllowAll,
    AllowColumns,
    BlockAll,
}

/// Replication mode of a single table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMode {
    SoftDelete,
    History,
    Live,
    /// A mode this client does not know about yet
    #[serde(other)]
    Unknown,
}

impl SyncMode {
    const KNOWN: &'static [&'static str] = &["SOFT_DELETE", "HISTORY", "LIVE"];

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }

    /// Deserialize an optional mode with no `Unknown` fallback.
    ///
    /// Used for desired state, where a misspelled mode must fail to load.
    pub(crate) fn deserialize_known<'de, D>(deserializer: D) -> std::result::Result<Option<Self>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as _;

        let Some(name) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        match name.as_str() {
            "SOFT_DELETE" => Ok(Some(Self::SoftDelete)),
            "HISTORY" => Ok(Some(Self::History)),
            "LIVE" => Ok(Some(Self::Live)),
            other => Err(D::Error::unknown_variant(other, Self::KNOWN)),
        }
    }
}

/// Column state as reported by the remote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnState {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub hashed: bool,
    #[serde(default)]
    pub is_primary_key: bool,
}

/// Table state as reported by the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableState {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_mode: Option<SyncMode>,
    /// Columns, when the remote includes them in the schema read
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub columns: BTreeMap<String, ColumnState>,
}

/// Schema state as reported by the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaState {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub tables: BTreeMap<String, TableState>,
}

/// The remote's schema tree for one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_change_handling: Option<SchemaChangeHandling>,
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaState>,
}

impl SchemaSnapshot {
    /// Parse and validate a schema read or PATCH response.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let snapshot: Self = parse_payload("schema snapshot", body)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// An empty map means discovery has not finished yet.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaState> {
        self.schemas.get(name)
    }

    pub fn table(&self, schema: &str, table: &str) -> Option<&TableState> {
        self.schemas.get(schema).and_then(|s| s.tables.get(table))
    }

    fn validate(&self) -> Result<()> {
        for (schema_name, schema) in &self.schemas {
            if schema_name.is_empty() {
                return Err(Error::payload("schema snapshot", "empty schema name"));
            }
            for (table_name, table) in &schema.tables {
                if table_name.is_empty() {
                    return Err(Error::payload(
                        "schema snapshot",
                        format!("empty table name in schema '{schema_name}'"),
                    ));
                }
                if table.columns.keys().any(String::is_empty) {
                    return Err(Error::payload(
                        "schema snapshot",
                        format!("empty column name in {schema_name}.{table_name}"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Column states for one (schema, table) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnState>,
}

impl ColumnSnapshot {
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let snapshot: Self = parse_payload("column snapshot", body)?;
        if snapshot.columns.keys().any(String::is_empty) {
            return Err(Error::payload("column snapshot", "empty column name"));
        }
        Ok(snapshot)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnState> {
        self.columns.get(name)
    }
}

/// Decode a remote payload, unwrapping a `{"code": ..., "data": {...}}`
/// envelope when the remote sends one.
pub fn parse_payload<T: DeserializeOwned>(what: &'static str, body: &[u8]) -> Result<T> {
    let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(body).map_err(|e| Error::payload(what, e.to_string()))?
    };

    let inner = match value {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or_default()
        }
        Value::Object(map) => Value::Object(map),
        other => {
            return Err(Error::payload(
                what,
                format!("expected a JSON object, got {other}"),
            ));
        }
    };

    serde_json::from_value(inner).map_err(|e| Error::payload(what, e.to_string()))
}
