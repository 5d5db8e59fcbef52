//! Production scenarios across the model, engine and transport crates
//!
//! Each test scripts the remote the way a busy data-integration service
//! behaves and checks what the engine sends and reports.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use schema_engine::client::endpoints;
use schema_engine::{BackoffConfig, Engine, EngineConfig, ErrorKind, Outcome};
use schema_model::{
    ColumnDesired, ConfigNode, DesiredTree, ExcludeMode, ReloadRequest, SchemaDesired, Scope,
    TableDesired,
};
use schema_test_utils::{MockTransport, Scripted, SnapshotBuilder, columns_json, plain_column};
use schema_transport::Method;
use serde_json::json;

const CONNECTION: &str = "conn_1";

// =============================================================================
// Test Infrastructure
// =============================================================================

fn config() -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::from_millis(1),
        backoff: BackoffConfig {
            base: Duration::from_millis(1),
            max: Duration::from_millis(8),
            factor: 2,
        },
        ..EngineConfig::default()
    }
}

fn engine(mock: &Arc<MockTransport>) -> Engine {
    Engine::new(mock.clone(), config())
}

fn busy() -> Scripted {
    Scripted::error(409, "ReloadInProgress", "schema reload in progress")
}

fn enabled_schema() -> SchemaDesired {
    SchemaDesired {
        enabled: Some(true),
        ..SchemaDesired::default()
    }
}

// =============================================================================
// Reload
// =============================================================================

#[test]
fn test_slow_reload_then_inspection() {
    let mock = Arc::new(MockTransport::new());
    let ready = SnapshotBuilder::new()
        .tables("public", &["orders", "users"])
        .disabled_table("public", "audit");
    mock.script(
        Method::Post,
        endpoints::reload(CONNECTION),
        [Scripted::timeout().after(Duration::from_millis(5))],
    );
    mock.script(
        Method::Get,
        endpoints::schemas(CONNECTION),
        [
            Scripted::json(200, SnapshotBuilder::new().json()),
            Scripted::error(503, "ServiceUnavailable", "try again later"),
            Scripted::json(200, ready.json()),
        ],
    );
    mock.respond(
        Method::Get,
        endpoints::columns(CONNECTION, "public", "users"),
        200,
        columns_json(&[("email", plain_column())]),
    );

    let engine = engine(&mock);
    let request = ReloadRequest::new(CONNECTION).with_exclude_mode(ExcludeMode::Exclude);
    let outcome = engine.reload(&request, Some(Duration::from_secs(10))).unwrap();

    assert!(outcome.polled);
    assert_eq!(outcome.polls, 3);
    assert_eq!(outcome.snapshot, ready.clone().build());

    // Reads after the reload see the same remote state
    assert_eq!(engine.read_schemas(CONNECTION).unwrap(), ready.build());
    let columns = engine.read_columns(CONNECTION, "public", "users").unwrap();
    assert_eq!(columns.column("email"), Some(&plain_column()));
}

#[test]
fn test_unknown_connection_is_reported_as_such() {
    let mock = Arc::new(MockTransport::new());
    mock.script(
        Method::Post,
        endpoints::reload("missing"),
        [Scripted::error(404, "NotFound_Connection", "Connector with id 'missing' not found")],
    );

    let tree = DesiredTree::new(vec![ConfigNode::schema("public", enabled_schema())]);
    let err = engine(&mock).reconcile("missing", &tree).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectionNotFound);
    assert_eq!(mock.count_method(Method::Patch), 0);
}

// =============================================================================
// Reconcile
// =============================================================================

#[test]
fn test_busy_remote_converges_then_rerun_is_a_no_op() {
    let mock = Arc::new(MockTransport::new());
    let initial = SnapshotBuilder::new()
        .tables("public", &["orders", "products"])
        .schema("public", false);
    let enabled = initial.clone().schema("public", true);
    let converged = enabled.clone().disabled_table("public", "products");

    mock.script(
        Method::Post,
        endpoints::reload(CONNECTION),
        [
            Scripted::json(200, initial.json()),
            Scripted::json(200, converged.json()),
        ],
    );
    mock.script(
        Method::Patch,
        endpoints::schemas(CONNECTION),
        [busy(), busy(), Scripted::json(200, enabled.json())],
    );
    mock.script(
        Method::Patch,
        endpoints::schema(CONNECTION, "public"),
        [busy(), Scripted::json(200, converged.json())],
    );

    let tree = DesiredTree::new(vec![
        ConfigNode::schema("public", enabled_schema()),
        ConfigNode::table(
            "public",
            "products",
            TableDesired {
                enabled: Some(false),
                ..TableDesired::default()
            },
        ),
    ]);
    let engine = engine(&mock);

    let first = engine.reconcile(CONNECTION, &tree).unwrap();
    assert!(first.is_success(), "report: {first:#?}");
    assert_eq!(first.entry(&Scope::schema("public")).unwrap().attempts, 3);
    assert_eq!(first.entry(&Scope::table("public", "products")).unwrap().attempts, 2);
    assert_eq!(first.snapshot, converged.clone().build());
    assert_eq!(mock.count_method(Method::Patch), 5);

    let second = engine.reconcile(CONNECTION, &tree).unwrap();
    assert!(second.is_success());
    assert!(second.entries.iter().all(|e| !e.changed && e.attempts == 0));
    assert_eq!(mock.count_method(Method::Patch), 5);
    assert_ne!(first.run_id, second.run_id);
}

#[test]
fn test_partial_failure_report() {
    let mock = Arc::new(MockTransport::new());
    let initial = SnapshotBuilder::new()
        .tables("analytics", &["events"])
        .tables("public", &["users"]);
    mock.respond(Method::Post, endpoints::reload(CONNECTION), 200, initial.json());
    mock.script(
        Method::Patch,
        endpoints::schema(CONNECTION, "analytics"),
        [Scripted::error(400, "InvalidInput", "events cannot be disabled")],
    );
    mock.respond(
        Method::Get,
        endpoints::columns(CONNECTION, "public", "users"),
        200,
        columns_json(&[("ssn", plain_column())]),
    );
    mock.respond(
        Method::Patch,
        endpoints::table(CONNECTION, "public", "users"),
        200,
        json!({"code": "Success", "data": {"columns": {"ssn": {"enabled": true, "hashed": true}}}}),
    );

    let hash = ColumnDesired {
        hashed: Some(true),
        ..ColumnDesired::default()
    };
    let tree = DesiredTree::new(vec![
        ConfigNode::table(
            "analytics",
            "events",
            TableDesired {
                enabled: Some(false),
                ..TableDesired::default()
            },
        ),
        ConfigNode::column("analytics", "events", "ip", hash),
        ConfigNode::column("public", "users", "ssn", hash),
    ]);
    let report = engine(&mock).reconcile(CONNECTION, &tree).unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed().count(), 1);
    assert_eq!(
        report.entry(&Scope::column("analytics", "events", "ip")).unwrap().outcome,
        Outcome::Skipped {
            blocked_by: Scope::table("analytics", "events")
        }
    );
    assert!(
        report
            .entry(&Scope::column("public", "users", "ssn"))
            .unwrap()
            .outcome
            .is_success()
    );
    assert_eq!(
        mock.count(Method::Get, &endpoints::columns(CONNECTION, "analytics", "events")),
        0
    );

    let value = serde_json::to_value(&report).unwrap();
    let failed = value["entries"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["status"] == "failed")
        .unwrap();
    assert_eq!(failed["kind"], "remote_failure");
    assert!(failed["reason"].as_str().unwrap().contains("events cannot be disabled"));
    let skipped = value["entries"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["status"] == "skipped")
        .unwrap();
    assert_eq!(skipped["blocked_by"], json!({"schema": "analytics", "table": "events"}));
}

#[test]
fn test_parallel_branches_share_one_run() {
    let mock = Arc::new(MockTransport::new());
    let names = ["alpha", "beta", "gamma", "delta"];
    let mut initial = SnapshotBuilder::new();
    for name in names {
        initial = initial.tables(name, &["t"]).schema(name, false);
    }
    mock.respond(Method::Post, endpoints::reload(CONNECTION), 200, initial.json());
    let mut enabled = initial.clone();
    for name in names {
        enabled = enabled.schema(name, true);
    }
    mock.respond(Method::Patch, endpoints::schemas(CONNECTION), 200, enabled.json());

    let config = EngineConfig {
        parallelism: 4,
        ..config()
    };
    let tree = DesiredTree::new(
        names
            .iter()
            .map(|name| ConfigNode::schema(*name, enabled_schema()))
            .collect(),
    );
    let report = Engine::new(mock.clone(), config)
        .reconcile(CONNECTION, &tree)
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.entries.len(), 4);
    assert_eq!(mock.count(Method::Patch, &endpoints::schemas(CONNECTION)), 4);
    let mut bodies: Vec<String> = mock
        .calls_to(Method::Patch, &endpoints::schemas(CONNECTION))
        .into_iter()
        .map(|c| c.body.unwrap().to_string())
        .collect();
    bodies.sort();
    let mut expected: Vec<String> = names
        .iter()
        .map(|name| json!({"schemas": {*name: {"enabled": true}}}).to_string())
        .collect();
    expected.sort();
    assert_eq!(bodies, expected);
}
