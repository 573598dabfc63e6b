//! Metrics collection and exposition.
//!
//! # Metrics
//! - `trace_sampling_decisions_total` (counter): decisions by outcome
//! - `trace_sampling_quota_transitions_total` (counter): quota engaged/released
//! - `service_drain_branches_total` (counter): drain branches by outcome
//! - `service_drain_branch_duration_seconds` (histogram): time spent per branch
//! - `service_listener_failures_total` (counter): fatal listener errors

use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DRAIN_SECONDS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 3.0, 5.0, 10.0, 20.0, 30.0];

/// Install the global Prometheus recorder and return the handle the debug listener renders.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("service_drain_branch_duration_seconds".to_string()),
            DRAIN_SECONDS,
        )?
        .install_recorder()
}

pub fn record_sampling_decision(decision: &'static str) {
    ::metrics::counter!("trace_sampling_decisions_total", "decision" => decision).increment(1);
}

pub fn record_quota_transition(transition: &'static str) {
    ::metrics::counter!("trace_sampling_quota_transitions_total", "transition" => transition)
        .increment(1);
}

pub fn record_drain_branch(branch: &'static str, outcome: &'static str, elapsed: Duration) {
    ::metrics::counter!("service_drain_branches_total", "branch" => branch, "outcome" => outcome)
        .increment(1);
    ::metrics::histogram!("service_drain_branch_duration_seconds", "branch" => branch)
        .record(elapsed.as_secs_f64());
}

pub fn record_listener_failure(listener: &'static str) {
    ::metrics::counter!("service_listener_failures_total", "listener" => listener).increment(1);
}
