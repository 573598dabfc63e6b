//! Always-on debug listener.
//!
//! Serves `/health` for load balancers, `/status` for operators, and
//! `/metrics` when a Prometheus recorder is installed.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

/// What the service reports about itself on `/status`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServiceStatus {
    pub service: String,
    pub version: String,
    pub environment: &'static str,
    pub subsystems: Vec<&'static str>,
}

/// Build the debug router.
pub fn debug_router(status: ServiceStatus, metrics: Option<PrometheusHandle>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/status", get(status_handler));

    if let Some(handle) = metrics {
        router = router.route(
            "/metrics",
            get(move || std::future::ready(handle.render())),
        );
    }

    router.with_state(Arc::new(status))
}

async fn health(State(status): State<Arc<ServiceStatus>>) -> String {
    format!("{} is ok\n", status.service)
}

async fn status_handler(State(status): State<Arc<ServiceStatus>>) -> Json<ServiceStatus> {
    Json(status.as_ref().clone())
}
