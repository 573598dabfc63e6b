//! Per-endpoint adaptive sampling decisions.
//!
//! # Responsibilities
//! - Skip background instrumentation traffic entirely
//! - Count traced calls per endpoint name in a sliding window
//! - Throttle hot endpoints to a periodic forced resample
//! - Release the throttle after a long cool-down below the threshold
//!
//! # Design Decisions
//! - The threshold is checked after counting the current call, strictly greater
//!   than [`QUOTA_THRESHOLD`], so the 21st call in a window is already over quota
//! - The whole decision for one endpoint runs under that endpoint's map shard
//!   lock, which keeps increments and hysteresis updates linearizable
//! - Sampling never fails; unknown endpoints are created on first sight

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::observability::metrics;
use crate::sampling::clock::{Clock, SystemClock};
use crate::sampling::window::SlidingWindowCounter;

/// Events per window above which an endpoint is throttled.
pub const QUOTA_THRESHOLD: u64 = 20;

/// Minimum time between forced samples while throttled.
pub const FORCED_RESAMPLE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Time an endpoint must stay at or below the threshold before the throttle is released.
pub const QUOTA_COOL_DOWN: Duration = Duration::from_secs(48 * 60 * 60);

/// Name prefixes of calls made by the profiling agent in the background.
pub const DEFAULT_EXCLUDED_PREFIXES: &[&str] = &[
    "google.devtools.cloudprofiler.",
    "Sent.google.devtools.cloudprofiler.",
];

/// Outcome of a single sampling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingDecision {
    /// Endpoint is under quota.
    Sample,
    /// Endpoint is over quota but a periodic resample was due.
    ForcedResample,
    /// Endpoint is over quota.
    Drop,
    /// Name belongs to background instrumentation.
    Excluded,
}

impl SamplingDecision {
    pub fn is_sampled(self) -> bool {
        matches!(self, Self::Sample | Self::ForcedResample)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sample => "sample",
            Self::ForcedResample => "forced_resample",
            Self::Drop => "drop",
            Self::Excluded => "excluded",
        }
    }
}

/// Point-in-time view of one endpoint's sampling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSnapshot {
    pub total: u64,
    pub quota_engaged_since: Option<Instant>,
    pub last_forced_resample: Option<Instant>,
}

#[derive(Debug)]
struct EndpointState {
    window: SlidingWindowCounter,
    quota_engaged_since: Option<Instant>,
    last_forced_resample: Option<Instant>,
    /// Last time a decision measured the window over quota; the cool-down runs from here.
    last_over_quota: Option<Instant>,
}

impl EndpointState {
    fn new(now: Instant) -> Self {
        Self {
            window: SlidingWindowCounter::new(now),
            quota_engaged_since: None,
            last_forced_resample: None,
            last_over_quota: None,
        }
    }

    fn decide(&mut self, endpoint: &str, now: Instant) -> SamplingDecision {
        self.window.increment(1, now);
        let total = self.window.total(now);

        if total > QUOTA_THRESHOLD {
            if self.quota_engaged_since.is_none() {
                tracing::info!(
                    endpoint = %endpoint,
                    total,
                    "Downgrading tracing to avoid sending too much data"
                );
                metrics::record_quota_transition("engaged");
                self.quota_engaged_since = Some(now);
            }
            self.last_over_quota = Some(now);

            let resample_due = match self.last_forced_resample {
                None => true,
                Some(at) => now.saturating_duration_since(at) >= FORCED_RESAMPLE_INTERVAL,
            };
            if resample_due {
                self.last_forced_resample = Some(now);
                return SamplingDecision::ForcedResample;
            }
            return SamplingDecision::Drop;
        }

        if let Some(last) = self.last_over_quota {
            if now.saturating_duration_since(last) >= QUOTA_COOL_DOWN {
                tracing::info!(endpoint = %endpoint, "Restoring full tracing after cool-down");
                metrics::record_quota_transition("released");
                self.quota_engaged_since = None;
                self.last_forced_resample = None;
                self.last_over_quota = None;
            }
        }

        SamplingDecision::Sample
    }

    fn snapshot(&mut self, now: Instant) -> EndpointSnapshot {
        EndpointSnapshot {
            total: self.window.total(now),
            quota_engaged_since: self.quota_engaged_since,
            last_forced_resample: self.last_forced_resample,
        }
    }
}

/// Sampler that throttles hot endpoints with quota hysteresis.
///
/// Safe to share between threads; callers for the same endpoint observe a
/// single ordered sequence of decisions.
#[derive(Debug)]
pub struct AdaptiveSampler {
    endpoints: DashMap<String, EndpointState>,
    excluded_prefixes: Vec<String>,
    clock: Arc<dyn Clock>,
}

impl AdaptiveSampler {
    /// Sampler on the system clock with the default exclusions.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            endpoints: DashMap::new(),
            excluded_prefixes: DEFAULT_EXCLUDED_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
            clock,
        }
    }

    /// Replace the excluded name prefixes.
    pub fn with_excluded_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_excluded(&self, endpoint: &str) -> bool {
        self.excluded_prefixes
            .iter()
            .any(|prefix| endpoint.starts_with(prefix.as_str()))
    }

    /// Decide whether the call to `endpoint` should be traced.
    pub fn decide(&self, endpoint: &str) -> bool {
        self.evaluate(endpoint).is_sampled()
    }

    /// Like [`decide`](Self::decide) but reports which rule produced the decision.
    pub fn evaluate(&self, endpoint: &str) -> SamplingDecision {
        if self.is_excluded(endpoint) {
            metrics::record_sampling_decision(SamplingDecision::Excluded.as_str());
            return SamplingDecision::Excluded;
        }

        let now = self.clock.now();
        let decision = match self.endpoints.get_mut(endpoint) {
            Some(mut state) => state.decide(endpoint, now),
            None => self
                .endpoints
                .entry(endpoint.to_owned())
                .or_insert_with(|| EndpointState::new(now))
                .decide(endpoint, now),
        };

        tracing::trace!(endpoint = %endpoint, decision = decision.as_str(), "Trace decision");
        metrics::record_sampling_decision(decision.as_str());
        decision
    }

    /// Current state of `endpoint`, if it has ever been observed.
    pub fn snapshot(&self, endpoint: &str) -> Option<EndpointSnapshot> {
        let now = self.clock.now();
        self.endpoints
            .get_mut(endpoint)
            .map(|mut state| state.snapshot(now))
    }

    /// Number of distinct endpoints with sampling state.
    pub fn tracked_endpoints(&self) -> usize {
        self.endpoints.len()
    }
}

impl Default for AdaptiveSampler {
    fn default() -> Self {
        Self::new()
    }
}
