//! Configuration model for connection schema reconciliation
//!
//! Describes the connection -> schema -> table -> column hierarchy on both
//! sides of a reconciliation:
//!
//! - **Snapshots**: what the remote reports ([`SchemaSnapshot`], [`ColumnSnapshot`])
//! - **Desired state**: what the user wants ([`ConfigNode`], [`DesiredConfig`])
//! - **Patches**: the minimal difference between the two ([`diff`])

pub mod diff;
pub mod document;
pub mod duration;
pub mod error;
pub mod node;
pub mod reload;
pub mod snapshot;
pub mod store;
pub mod validation;

pub use diff::{ColumnPatch, SchemaPatch, SchemaSettingsPatch, TablePatch};
pub use document::{DesiredConfig, SchemaEntry, TableEntry};
pub use duration::{format_duration, parse_duration};
pub use error::{Error, Result};
pub use node::{ColumnDesired, ConfigNode, DesiredTree, Level, Scope, SchemaDesired, TableDesired};
pub use reload::{ExcludeMode, ReloadRequest};
pub use snapshot::{
    ColumnSnapshot, ColumnState, SchemaChangeHandling, SchemaSnapshot, SchemaState, SyncMode,
    TableState, parse_payload,
};
pub use store::ConfigStore;
pub use validation::validate_nodes;
