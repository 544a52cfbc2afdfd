//! Runtime engine: starts, stops and recovers workspace runtimes on top of
//! the provisioning pipeline, the runtime cache and the agent bootstrapper.

pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod errors;
pub mod infra;

pub use bootstrap::{build_engine, build_engine_from_env};
pub use config::{EngineConfig, StorageConfig};
pub use engine::RuntimeEngine;
pub use errors::{EngineError, StartError};
pub use infra::{
    InfraError, InfraRealizer, MachineTokenSource, RealizedMachines,
    RuntimeHandle,
};

use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Installs the global subscriber. `RUST_LOG` adds to `default_env`;
/// `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing(default_env: &str) {
    let filter = EnvFilter::builder()
        .with_env_var("RUST_LOG")
        .from_env_lossy()
        .add_directive(
            default_env
                .parse()
                .unwrap_or_else(|_| LevelFilter::INFO.into()),
        );

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let fmt_layer = if json {
        fmt_layer.json().boxed()
    } else {
        fmt_layer.boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init();
}
