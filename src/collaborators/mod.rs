//! Seams to the frameworks and agents the service core drives.
//!
//! # Data Flow
//! ```text
//! lifecycle::startup
//!     → agents.rs (profiler start, trace exporter flush on drain)
//!     → rpc.rs (serve on the RPC listener, graceful stop on drain)
//!
//! RPC framework interceptors
//!     → rpc.rs (log failed calls, classify status codes)
//!     → reporting.rs (forward unexpected failures to crash reporting)
//! ```
//!
//! # Design Decisions
//! - Every collaborator is a trait object so tests can substitute fakes
//! - Async trait methods return boxed futures to stay object safe

pub mod agents;
pub mod reporting;
pub mod rpc;

pub use agents::{Profiler, ProfilerConfig, TraceExporter};
pub use reporting::{ErrorReporter, ReportContext};
pub use rpc::{RpcErrorLogger, RpcServer};

/// Error type returned across collaborator seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
