//! Typed calls against the remote schema API
//!
//! [`ApiClient`] turns engine operations into [`Request`]s, sends them
//! through a [`Transport`], and maps responses onto snapshots or the engine's
//! error taxonomy. It never retries; retrying is the caller's decision.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use schema_model::{
    ColumnSnapshot, ReloadRequest, SchemaPatch, SchemaSettingsPatch, SchemaSnapshot, Scope,
    TablePatch,
};
use schema_transport::{Request, Response, Transport, TransportErrorKind};
use serde::Serialize;
use tracing::debug;

use crate::classify::{ConflictClassifier, MarkerClassifier, RemoteError};
use crate::{Error, Result};

/// Paths of the remote endpoints, with every name segment percent-encoded.
pub mod endpoints {
    use schema_transport::api_path;

    pub fn reload(connection_id: &str) -> String {
        api_path(&["v1", "connectors", connection_id, "schemas", "reload"])
    }

    pub fn schemas(connection_id: &str) -> String {
        api_path(&["v1", "connectors", connection_id, "schemas"])
    }

    pub fn schema(connection_id: &str, schema: &str) -> String {
        api_path(&["v1", "connectors", connection_id, "schemas", schema])
    }

    pub fn table(connection_id: &str, schema: &str, table: &str) -> String {
        api_path(&["v1", "connectors", connection_id, "schemas", schema, "tables", table])
    }

    pub fn columns(connection_id: &str, schema: &str, table: &str) -> String {
        api_path(&[
            "v1",
            "connectors",
            connection_id,
            "schemas",
            schema,
            "tables",
            table,
            "columns",
        ])
    }
}

/// What a 404 from a given endpoint means.
enum Missing<'a> {
    Connection(&'a str),
    Resource(String),
}

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    classifier: Arc<dyn ConflictClassifier>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_classifier(transport, Arc::new(MarkerClassifier::default()))
    }

    pub fn with_classifier(
        transport: Arc<dyn Transport>,
        classifier: Arc<dyn ConflictClassifier>,
    ) -> Self {
        Self {
            transport,
            classifier,
        }
    }

    /// POST a reload. The remote answers with the rediscovered schema.
    ///
    /// Conflict responses are not singled out here: a reload that cannot run
    /// is a failed action.
    pub fn reload(&self, request: &ReloadRequest, timeout: Duration) -> Result<SchemaSnapshot> {
        let connection_id = request.connection_id();
        let body = serde_json::to_vec(&request.body())?;
        let response = self.send(
            Request::post(endpoints::reload(connection_id), body).with_timeout(timeout),
            "reload",
        )?;
        if !response.is_success() {
            return Err(self.failure(&response, Missing::Connection(connection_id), None));
        }
        Ok(SchemaSnapshot::from_json(&response.body)?)
    }

    pub fn read_schemas(&self, connection_id: &str, timeout: Duration) -> Result<SchemaSnapshot> {
        let response = self.send(
            Request::get(endpoints::schemas(connection_id)).with_timeout(timeout),
            "read schemas",
        )?;
        if !response.is_success() {
            return Err(self.failure(&response, Missing::Connection(connection_id), None));
        }
        Ok(SchemaSnapshot::from_json(&response.body)?)
    }

    pub fn read_columns(
        &self,
        connection_id: &str,
        schema: &str,
        table: &str,
        timeout: Duration,
    ) -> Result<ColumnSnapshot> {
        let response = self.send(
            Request::get(endpoints::columns(connection_id, schema, table)).with_timeout(timeout),
            "read columns",
        )?;
        if !response.is_success() {
            let missing = Missing::Resource(Scope::table(schema, table).to_string());
            return Err(self.failure(&response, missing, None));
        }
        Ok(ColumnSnapshot::from_json(&response.body)?)
    }

    /// PATCH connection-wide schema settings (change handling and per-schema state).
    pub fn patch_settings(
        &self,
        connection_id: &str,
        patch: &SchemaSettingsPatch,
        scope: &Scope,
        timeout: Duration,
    ) -> Result<SchemaSnapshot> {
        let path = endpoints::schemas(connection_id);
        let response = self.write(path, patch, scope, timeout)?;
        if !response.is_success() {
            return Err(self.failure(&response, Missing::Connection(connection_id), Some(scope)));
        }
        Ok(SchemaSnapshot::from_json(&response.body)?)
    }

    /// PATCH table configuration within one schema.
    pub fn patch_schema(
        &self,
        connection_id: &str,
        schema: &str,
        patch: &SchemaPatch,
        scope: &Scope,
        timeout: Duration,
    ) -> Result<SchemaSnapshot> {
        let path = endpoints::schema(connection_id, schema);
        let response = self.write(path, patch, scope, timeout)?;
        if !response.is_success() {
            let missing = Missing::Resource(Scope::schema(schema).to_string());
            return Err(self.failure(&response, missing, Some(scope)));
        }
        Ok(SchemaSnapshot::from_json(&response.body)?)
    }

    /// PATCH column configuration of one table.
    pub fn patch_table(
        &self,
        connection_id: &str,
        schema: &str,
        table: &str,
        patch: &TablePatch,
        scope: &Scope,
        timeout: Duration,
    ) -> Result<ColumnSnapshot> {
        let path = endpoints::table(connection_id, schema, table);
        let response = self.write(path, patch, scope, timeout)?;
        if !response.is_success() {
            let missing = Missing::Resource(Scope::table(schema, table).to_string());
            return Err(self.failure(&response, missing, Some(scope)));
        }
        Ok(ColumnSnapshot::from_json(&response.body)?)
    }

    fn write<B: Serialize>(
        &self,
        path: String,
        patch: &B,
        scope: &Scope,
        timeout: Duration,
    ) -> Result<Response> {
        let body = serde_json::to_vec(patch)?;
        self.send(
            Request::patch(path, body).with_timeout(timeout),
            &format!("apply {scope}"),
        )
    }

    fn send(&self, request: Request, operation: &str) -> Result<Response> {
        debug!(method = %request.method, path = %request.path, "Sending request");
        match self.transport.call(&request) {
            Ok(response) => {
                debug!(path = %request.path, status = response.status, "Received response");
                Ok(response)
            }
            Err(err) if err.is_timeout() => Err(Error::TransportTimeout {
                operation: operation.to_string(),
                message: err.message,
            }),
            Err(err) if err.kind == TransportErrorKind::BodyTooLarge => Err(Error::remote(
                None,
                format!("{operation} failed: {}", err.message),
            )),
            Err(err) => Err(Error::remote(None, err.to_string())),
        }
    }

    fn failure(&self, response: &Response, missing: Missing<'_>, conflict_scope: Option<&Scope>) -> Error {
        let error = RemoteError::parse(&response.body);
        let message = error.describe(&format!("HTTP {}", response.status));

        if response.status == 404 {
            return match missing {
                Missing::Connection(connection_id) => Error::ConnectionNotFound {
                    connection_id: connection_id.to_string(),
                    message,
                },
                Missing::Resource(resource) => Error::NotFound { resource, message },
            };
        }

        if let Some(scope) = conflict_scope {
            if self.classifier.is_conflict(response.status, &error) {
                return Error::ConflictDetected {
                    scope: scope.to_string(),
                    message,
                };
            }
        }

        Error::remote(Some(response.status), message)
    }
}
