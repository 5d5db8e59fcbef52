//! Reconciliation engine for connection schema configuration
//!
//! The remote discovers a connection's schemas asynchronously and rejects
//! writes while the schema is still changing. This crate hides that behind
//! blocking calls bounded by caller deadlines:
//!
//! - [`ActionInvoker`] triggers a schema reload and, when the call times out
//!   in the transport, falls back to polling with [`Poller`]
//! - [`Applier`] sends one level's patch and retries conflicts using
//!   [`BackoffPolicy`] delays until the deadline
//! - [`Reconciler`] walks a [`DesiredTree`](schema_model::DesiredTree) schema
//!   first, then tables, then columns, skipping the children of failed nodes
//!
//! [`Engine`] wires them together from an [`EngineConfig`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use schema_engine::{Engine, EngineConfig};
//! use schema_model::{ConfigNode, DesiredTree, SchemaDesired};
//! use schema_transport::HttpTransport;
//!
//! let transport = HttpTransport::builder("https://api.example.com")
//!     .authorization("Basic dXNlcjpwYXNz")
//!     .build();
//! let engine = Engine::new(Arc::new(transport), EngineConfig::default());
//!
//! let tree = DesiredTree::new(vec![ConfigNode::schema(
//!     "public",
//!     SchemaDesired {
//!         enabled: Some(true),
//!         disabled_tables: ["products".to_string()].into(),
//!     },
//! )]);
//! let report = engine.reconcile("connection_id", &tree).unwrap();
//! assert!(report.is_success());
//! ```

pub mod apply;
pub mod classify;
pub mod client;
pub mod config;
pub mod deadline;
pub mod error;
pub mod invoke;
pub mod poll;
pub mod reconcile;
pub mod report;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use schema_model::{ColumnSnapshot, DesiredTree, ReloadRequest, SchemaSnapshot};
use schema_transport::Transport;

pub use apply::{Applied, Applier, AttemptState, Desired, Known, Snapshot};
pub use classify::{ConflictClassifier, MarkerClassifier, RemoteError};
pub use client::ApiClient;
pub use config::EngineConfig;
pub use deadline::Deadline;
pub use error::{Error, ErrorKind, Result};
pub use invoke::{
    ActionInvoker, MAX_INVOKE_TIMEOUT, ReloadEvent, ReloadMachine, ReloadOutcome, ReloadPhase,
    ReloadSummary, validate_timeout,
};
pub use poll::{Polled, Poller};
pub use reconcile::Reconciler;
pub use report::{NodeReport, Outcome, ReconcileReport, TableColumns};
pub use retry::{BackoffConfig, BackoffPolicy};

/// The engine's components built from one [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    client: ApiClient,
    invoker: ActionInvoker,
    reconciler: Reconciler,
}

impl Engine {
    pub fn new(transport: Arc<dyn Transport>, config: EngineConfig) -> Self {
        let classifier: Arc<dyn ConflictClassifier> = Arc::new(config.conflict.clone());
        Self::with_classifier(transport, classifier, config)
    }

    /// Use a custom conflict classifier instead of `config.conflict`.
    pub fn with_classifier(
        transport: Arc<dyn Transport>,
        classifier: Arc<dyn ConflictClassifier>,
        config: EngineConfig,
    ) -> Self {
        let client = ApiClient::with_classifier(transport, classifier);
        let invoker = ActionInvoker::new(client.clone(), Poller::new(config.poll_interval));
        let applier = Applier::new(client.clone(), config.backoff_policy());
        let reconciler = Reconciler::new(client.clone(), invoker.clone(), applier)
            .with_invoke_timeout(config.invoke_timeout)
            .with_parallelism(config.parallelism);
        Self {
            config,
            client,
            invoker,
            reconciler,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reload a connection's schema. `timeout` defaults to the configured invoke timeout.
    pub fn reload(&self, request: &ReloadRequest, timeout: Option<Duration>) -> Result<ReloadOutcome> {
        self.invoker
            .invoke(request, timeout.unwrap_or(self.config.invoke_timeout))
    }

    pub fn read_schemas(&self, connection_id: &str) -> Result<SchemaSnapshot> {
        self.client
            .read_schemas(connection_id, self.config.operation_timeout)
    }

    pub fn read_columns(&self, connection_id: &str, schema: &str, table: &str) -> Result<ColumnSnapshot> {
        self.client
            .read_columns(connection_id, schema, table, self.config.operation_timeout)
    }

    /// Reconcile within the configured operation timeout.
    pub fn reconcile(&self, connection_id: &str, tree: &DesiredTree) -> Result<ReconcileReport> {
        self.reconcile_with_deadline(
            connection_id,
            tree,
            Deadline::after(self.config.operation_timeout),
        )
    }

    pub fn reconcile_with_deadline(
        &self,
        connection_id: &str,
        tree: &DesiredTree,
        deadline: Deadline,
    ) -> Result<ReconcileReport> {
        self.reconciler.reconcile(connection_id, tree, deadline)
    }
}
