//! Command implementations

pub mod apply;
pub mod reload;
pub mod show;

pub use apply::run_apply;
pub use reload::run_reload;
pub use show::run_show;

use schema_model::SchemaChangeHandling;

/// Wire name of a handling policy, e.g. `ALLOW_ALL`.
fn handling_name(handling: SchemaChangeHandling) -> String {
    serde_json::to_value(handling)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{handling:?}"))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use schema_engine::{BackoffConfig, Engine, EngineConfig};
    use schema_test_utils::MockTransport;

    pub const CONNECTION: &str = "conn_1";

    pub fn engine(mock: &Arc<MockTransport>) -> Engine {
        let config = EngineConfig {
            poll_interval: Duration::from_millis(1),
            backoff: BackoffConfig {
                base: Duration::from_millis(1),
                max: Duration::from_millis(4),
                factor: 2,
            },
            ..EngineConfig::default()
        };
        Engine::new(mock.clone(), config)
    }
}
