//! Shared test utilities for the schema reconciler workspace.
//!
//! Fixtures used by more than one crate's test suite live here so each suite
//! scripts the remote the same way. Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`mock`]: [`MockTransport`], a scripted in-memory [`Transport`](schema_transport::Transport)
//! - [`snapshot`]: [`SnapshotBuilder`] for remote schema payloads

pub mod mock;
pub mod snapshot;

pub use mock::{MockTransport, RecordedCall, Scripted};
pub use snapshot::{SnapshotBuilder, columns_json, plain_column};
