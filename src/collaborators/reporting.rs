//! Crash/error reporting client seam.

use std::error::Error;

/// Where an error happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportContext {
    pub service: String,
    /// Full RPC method name when the error comes from an RPC call.
    pub rpc_method: Option<String>,
}

impl ReportContext {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            rpc_method: None,
        }
    }

    pub fn with_rpc_method(mut self, method: impl Into<String>) -> Self {
        self.rpc_method = Some(method.into());
        self
    }
}

/// Client of the crash reporting service.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, context: &ReportContext, error: &(dyn Error + Send + Sync + 'static));
}
