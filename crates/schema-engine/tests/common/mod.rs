#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use schema_engine::{BackoffConfig, Engine, EngineConfig};
use schema_engine::client::endpoints;
use schema_test_utils::{MockTransport, SnapshotBuilder};
use schema_transport::Method;

pub const CONNECTION: &str = "conn_1";

/// Production behaviour with millisecond timing.
pub fn fast_config() -> EngineConfig {
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

pub fn engine(mock: &Arc<MockTransport>) -> Engine {
    Engine::new(mock.clone(), fast_config())
}

pub fn engine_with(mock: &Arc<MockTransport>, config: EngineConfig) -> Engine {
    Engine::new(mock.clone(), config)
}

/// Script a successful reload answering with `snapshot`.
pub fn script_reload(mock: &MockTransport, snapshot: &SnapshotBuilder) {
    mock.respond(Method::Post, endpoints::reload(CONNECTION), 200, snapshot.json());
}

pub fn patch_paths(mock: &MockTransport) -> Vec<String> {
    mock.calls()
        .into_iter()
        .filter(|c| c.method == Method::Patch)
        .map(|c| c.path)
        .collect()
}
