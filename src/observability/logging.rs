//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once, from `main`
//! - Pick the output format from the service environment
//!
//! # Design Decisions
//! - JSON format for production, pretty format with debug level for local runs
//! - `RUST_LOG` overrides the configured level

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::Environment;

/// Default filter directive for the given environment and configured level.
pub fn default_directive(environment: Environment, log_level: &str) -> String {
    let level = if environment.is_local() { "debug" } else { log_level };
    format!("service_runtime={level},tower_http={level},info")
}

/// Install the global subscriber.
///
/// Panics if a subscriber is already installed; call it once at startup.
pub fn init(environment: Environment, log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive(environment, log_level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if environment.is_local() {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .init();
    }
}
