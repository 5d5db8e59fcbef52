//! End-to-end integration test for the reconciliation slice
//!
//! Exercises the complete flow: configuration files on disk -> engine ->
//! reload with poll fallback -> hierarchical apply -> JSON report.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use schema_engine::client::endpoints;
use schema_engine::{Engine, EngineConfig};
use schema_model::{ColumnState, ConfigStore, DesiredConfig, ExcludeMode, SchemaChangeHandling};
use schema_test_utils::{MockTransport, Scripted, SnapshotBuilder, columns_json, plain_column};
use schema_transport::Method;
use serde_json::json;
use tempfile::TempDir;

const CONNECTION: &str = "conn_1";

/// Write an engine config and a desired configuration into a temp dir
fn setup_files() -> TempDir {
    let temp = TempDir::new().unwrap();

    fs::write(
        temp.path().join("engine.yaml"),
        r#"
base_url: https://api.example.com
invoke_timeout: 5s
operation_timeout: 30s
poll_interval: 1ms
backoff:
  base: 1ms
  max: 4ms
"#,
    )
    .unwrap();

    fs::write(
        temp.path().join("desired.yaml"),
        r#"
connection_id: conn_1
exclude_mode: EXCLUDE
schema_change_handling: ALLOW_COLUMNS
schemas:
  public:
    tables:
      users:
        enabled: true
        columns:
          email:
            hashed: true
"#,
    )
    .unwrap();

    temp
}

fn pk_column() -> ColumnState {
    ColumnState {
        is_primary_key: true,
        ..plain_column()
    }
}

#[test]
fn test_load_files() {
    let temp = setup_files();

    let config = EngineConfig::load(&temp.path().join("engine.yaml")).unwrap();
    assert_eq!(config.base_url.as_deref(), Some("https://api.example.com"));
    assert_eq!(config.invoke_timeout, Duration::from_secs(5));
    assert_eq!(config.backoff.max, Duration::from_millis(4));

    let desired: DesiredConfig = ConfigStore::new()
        .load(&temp.path().join("desired.yaml"))
        .unwrap();
    let tree = desired.tree().unwrap();
    assert_eq!(tree.exclude_mode, ExcludeMode::Exclude);
    assert_eq!(tree.schema_change_handling, Some(SchemaChangeHandling::AllowColumns));
    assert_eq!(tree.nodes.len(), 3);
}

#[test]
fn test_files_to_report() {
    let temp = setup_files();
    let config = EngineConfig::load(&temp.path().join("engine.yaml")).unwrap();
    let desired: DesiredConfig = ConfigStore::new()
        .load(&temp.path().join("desired.yaml"))
        .unwrap();

    let initial = SnapshotBuilder::new().tables("public", &["users"]);
    let handled = initial.clone().handling(SchemaChangeHandling::AllowColumns);

    let mock = Arc::new(MockTransport::new());
    mock.script(Method::Post, endpoints::reload(CONNECTION), [Scripted::timeout()]);
    mock.respond(Method::Get, endpoints::schemas(CONNECTION), 200, initial.json());
    mock.respond(Method::Patch, endpoints::schemas(CONNECTION), 200, handled.json());
    mock.respond(
        Method::Get,
        endpoints::columns(CONNECTION, "public", "users"),
        200,
        columns_json(&[("email", plain_column()), ("id", pk_column())]),
    );
    mock.respond(
        Method::Patch,
        endpoints::table(CONNECTION, "public", "users"),
        200,
        columns_json(&[("email", ColumnState { hashed: true, ..plain_column() })]),
    );

    let engine = Engine::new(mock.clone(), config);
    let report = engine
        .reconcile(&desired.connection_id, &desired.tree().unwrap())
        .unwrap();

    assert!(report.is_success(), "report: {report:#?}");

    // Reload carried the document's exclude mode, then fell back to one poll
    assert_eq!(
        mock.calls_to(Method::Post, &endpoints::reload(CONNECTION))[0].body,
        Some(json!({"exclude_mode": "EXCLUDE"}))
    );
    assert_eq!(mock.count(Method::Get, &endpoints::schemas(CONNECTION)), 1);

    // Only the handling and the column changed
    assert_eq!(
        mock.calls_to(Method::Patch, &endpoints::schemas(CONNECTION))
            .into_iter()
            .map(|c| c.body.unwrap())
            .collect::<Vec<_>>(),
        vec![json!({"schema_change_handling": "ALLOW_COLUMNS"})]
    );
    assert_eq!(
        mock.calls_to(Method::Patch, &endpoints::table(CONNECTION, "public", "users"))[0].body,
        Some(json!({"columns": {"email": {"hashed": true}}}))
    );
    assert_eq!(mock.count(Method::Patch, &endpoints::schema(CONNECTION, "public")), 0);

    let columns = report.columns_of("public", "users").unwrap();
    assert!(columns.column("email").unwrap().hashed);
    assert!(columns.column("id").unwrap().is_primary_key);
    assert_eq!(
        report.snapshot.schema_change_handling,
        Some(SchemaChangeHandling::AllowColumns)
    );

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["connection_id"], "conn_1");
    assert!(value["run_id"].is_string());
    assert_eq!(value["reload"]["polled"], true);
    assert_eq!(value["reload"]["polls"], 1);
    assert_eq!(value["entries"].as_array().unwrap().len(), 4);
    assert_eq!(value["entries"][0]["level"], "connection");
    assert_eq!(value["entries"][3]["level"], "column");
    assert_eq!(
        value["entries"][3]["scope"],
        json!({"schema": "public", "table": "users", "column": "email"})
    );
    assert_eq!(value["entries"][3]["status"], "success");
    assert_eq!(value["entries"][3]["changed"], true);
    assert_eq!(value["entries"][2]["changed"], false);
}

#[test]
fn test_conflict_rules_come_from_config_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("engine.json");
    fs::write(
        &path,
        r#"{
  "poll_interval": "1ms",
  "backoff": {"base": "1ms", "max": "2ms", "factor": 2},
  "conflict": {"statuses": [409, 423], "markers": []}
}"#,
    )
    .unwrap();
    let config = EngineConfig::load(&path).unwrap();

    let initial = SnapshotBuilder::new().tables("public", &["orders"]).schema("public", false);
    let mock = Arc::new(MockTransport::new());
    mock.respond(Method::Post, endpoints::reload(CONNECTION), 200, initial.json());
    mock.script(
        Method::Patch,
        endpoints::schemas(CONNECTION),
        [
            Scripted::error(423, "Locked", "connection is locked"),
            Scripted::error(409, "AnythingElse", "still busy"),
            Scripted::json(200, initial.clone().schema("public", true).json()),
        ],
    );

    let desired: DesiredConfig = serde_json::from_value(json!({
        "connection_id": CONNECTION,
        "schemas": {"public": {"enabled": true}}
    }))
    .unwrap();
    let report = Engine::new(mock.clone(), config)
        .reconcile(CONNECTION, &desired.tree().unwrap())
        .unwrap();

    assert!(report.is_success());
    let entry = &report.entries[0];
    assert_eq!(entry.attempts, 3);
    assert_eq!(mock.count(Method::Patch, &endpoints::schemas(CONNECTION)), 3);
}
