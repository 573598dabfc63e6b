//! Adaptive trace sampling subsystem.
//!
//! # Data Flow
//! ```text
//! Traced call (HTTP route, RPC method)
//!     → sampler.rs (exclusion check, per-endpoint state lookup)
//!     → window.rs (count the event in a 10 minute sliding window)
//!     → sampler.rs (quota engagement / forced resample / release)
//!     → sample or drop
//! ```
//!
//! # Design Decisions
//! - One sliding window per endpoint name, created lazily, never evicted
//! - Endpoints over quota are throttled to one sample every 10 minutes
//! - Quota is released only after 48 hours below the threshold (hysteresis)
//! - Time comes from an injectable [`Clock`] so every rule is testable

pub mod clock;
pub mod sampler;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use sampler::{AdaptiveSampler, EndpointSnapshot, SamplingDecision};
pub use window::SlidingWindowCounter;
