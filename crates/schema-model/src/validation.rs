//! Local validation of desired configuration trees

use std::collections::{BTreeSet, HashSet};

use crate::node::{ConfigNode, Scope};
use crate::{Error, Result};

/// Reject trees that could never be applied cleanly.
///
/// Checks run before any remote call: names must be non-empty, each scope may
/// appear at most once, a table's sync mode must be one this client knows,
/// and a table may not ask for a column to be both disabled and hashed or
/// disabled and used as a primary key.
pub fn validate_nodes(nodes: &[ConfigNode]) -> Result<()> {
    let mut seen: HashSet<Scope> = HashSet::new();

    for node in nodes {
        let scope = node.scope();
        let names = [&scope.schema, &scope.table, &scope.column];
        if names.iter().any(|n| n.as_deref() == Some("")) {
            return Err(Error::tree(format!("empty name in {} node '{scope}'", node.level())));
        }
        if !seen.insert(scope.clone()) {
            return Err(Error::tree(format!("duplicate {} node for '{scope}'", node.level())));
        }

        match node {
            ConfigNode::SchemaLevel { desired, .. } => {
                if desired.disabled_tables.iter().any(String::is_empty) {
                    return Err(Error::tree(format!("empty table name in '{scope}'")));
                }
            }
            ConfigNode::TableLevel { desired, .. } => {
                if desired.sync_mode.is_some_and(|mode| !mode.is_known()) {
                    return Err(Error::tree(format!("unknown sync mode for table '{scope}'")));
                }
                overlap(&scope, "disabled", &desired.disabled_columns, "hashed", &desired.hashed_columns)?;
                overlap(&scope, "disabled", &desired.disabled_columns, "primary key", &desired.pk_columns)?;
            }
            ConfigNode::ColumnLevel { desired, .. } => {
                if desired.enabled == Some(false)
                    && (desired.hashed == Some(true) || desired.is_primary_key == Some(true))
                {
                    return Err(Error::tree(format!(
                        "column '{scope}' cannot be disabled and hashed or used as a primary key"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn overlap(
    scope: &Scope,
    left_name: &str,
    left: &BTreeSet<String>,
    right_name: &str,
    right: &BTreeSet<String>,
) -> Result<()> {
    match left.intersection(right).next() {
        Some(column) => Err(Error::tree(format!(
            "column '{column}' in '{scope}' is both {left_name} and {right_name}"
        ))),
        None => Ok(()),
    }
}
