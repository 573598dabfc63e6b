//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters and histograms)
//!     → tracing.rs (sampled spans for traced calls)
//!
//! Consumers:
//!     → stdout (JSON in production, pretty output locally)
//!     → debug listener /metrics (Prometheus scrape)
//!     → trace exporter (flushed on drain)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing outside local environments
//! - Metrics go through the `metrics` facade; only the binary installs a recorder
//! - Every traced call asks the adaptive sampler before opening a span

pub mod logging;
pub mod metrics;
pub mod tracing;
