//! Trace sampling hook for traced transports.
//!
//! # Responsibilities
//! - Hand the adaptive sampler to every transport that produces traces
//! - Wrap sampled HTTP requests in a `traced_call` span
//!
//! # Design Decisions
//! - Tracing is off unless a trace exporter is configured; the disabled hook drops everything
//! - HTTP endpoints are named by their matched route, so path parameters do not
//!   create new sampling state
//! - Requests that match no route are never traced

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use ::tracing::Instrument;

use crate::sampling::AdaptiveSampler;

/// Sampling decision hook installed by the lifecycle coordinator.
#[derive(Debug, Clone, Default)]
pub struct SamplingHook {
    sampler: Option<Arc<AdaptiveSampler>>,
}

impl SamplingHook {
    pub fn new(sampler: Arc<AdaptiveSampler>) -> Self {
        Self {
            sampler: Some(sampler),
        }
    }

    /// Hook used when trace export is not enabled.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.sampler.is_some()
    }

    /// Whether the call to `endpoint` should be traced.
    pub fn should_sample(&self, endpoint: &str) -> bool {
        match &self.sampler {
            Some(sampler) => sampler.decide(endpoint),
            None => false,
        }
    }

    pub fn sampler(&self) -> Option<&Arc<AdaptiveSampler>> {
        self.sampler.as_ref()
    }
}

/// Middleware asking the sampler whether to trace each routed request.
pub async fn sampling_middleware(
    State(hook): State<SamplingHook>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // Unmatched paths never create sampler state.
    let Some(endpoint) = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
    else {
        return next.run(request).await;
    };

    if hook.should_sample(&endpoint) {
        let span = ::tracing::info_span!("traced_call", endpoint = %endpoint);
        next.run(request).instrument(span).await
    } else {
        next.run(request).await
    }
}
