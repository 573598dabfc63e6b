//! Profiling and trace export agents.

use futures_util::future::BoxFuture;

use crate::collaborators::BoxError;

/// Identity the profiling agent reports under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilerConfig {
    pub service: String,
    pub version: String,
}

/// Continuous profiling agent, started once before listeners bind.
pub trait Profiler: Send + Sync {
    fn start(&self, config: &ProfilerConfig) -> Result<(), BoxError>;
}

/// Exporter holding buffered trace spans.
pub trait TraceExporter: Send + Sync {
    /// Push every buffered span out. Called once while draining.
    fn flush(&self) -> BoxFuture<'_, ()>;
}
