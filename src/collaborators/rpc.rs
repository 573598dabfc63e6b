//! RPC framework seam and failed-call handling.
//!
//! # Responsibilities
//! - Serve registered RPC services on the listener the coordinator binds
//! - Stop gracefully when the service drains
//! - Log every failed call and report the unexpected ones
//!
//! # Design Decisions
//! - Client-caused status codes (bad input, missing entities, conflicts) are
//!   logged but never reported; everything else is a bug worth a report
//! - Errors without a status code are always reported

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::net::TcpListener;

use crate::collaborators::reporting::{ErrorReporter, ReportContext};
use crate::collaborators::BoxError;
use crate::observability::tracing::SamplingHook;

/// RPC server with its services already registered.
pub trait RpcServer: Send + Sync {
    /// Serve on `listener` until [`graceful_stop`](Self::graceful_stop) is called.
    ///
    /// `sampling` decides which calls are traced.
    fn serve(&self, listener: TcpListener, sampling: SamplingHook) -> BoxFuture<'_, Result<(), BoxError>>;

    /// Stop accepting calls and wait for in-flight ones to finish.
    fn graceful_stop(&self) -> BoxFuture<'_, ()>;
}

/// Canonical RPC status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl RpcCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RpcCode::Ok => "OK",
            RpcCode::Cancelled => "Canceled",
            RpcCode::Unknown => "Unknown",
            RpcCode::InvalidArgument => "InvalidArgument",
            RpcCode::DeadlineExceeded => "DeadlineExceeded",
            RpcCode::NotFound => "NotFound",
            RpcCode::AlreadyExists => "AlreadyExists",
            RpcCode::PermissionDenied => "PermissionDenied",
            RpcCode::ResourceExhausted => "ResourceExhausted",
            RpcCode::FailedPrecondition => "FailedPrecondition",
            RpcCode::Aborted => "Aborted",
            RpcCode::OutOfRange => "OutOfRange",
            RpcCode::Unimplemented => "Unimplemented",
            RpcCode::Internal => "Internal",
            RpcCode::Unavailable => "Unavailable",
            RpcCode::DataLoss => "DataLoss",
            RpcCode::Unauthenticated => "Unauthenticated",
        }
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed RPC call.
#[derive(Debug)]
pub enum RpcFailure {
    /// The handler returned a status.
    Status { code: RpcCode, message: String },
    /// The handler failed with a plain error.
    Other(BoxError),
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcFailure::Status { code, message } => write!(f, "rpc error: code = {code} desc = {message}"),
            RpcFailure::Other(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RpcFailure {}

/// What to do with a failed call after logging it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    LogOnly,
    Report,
}

/// Decide whether a failure deserves a crash report.
pub fn classify_rpc_error(failure: &RpcFailure) -> ErrorDisposition {
    match failure {
        RpcFailure::Status { code, .. } => match code {
            RpcCode::InvalidArgument
            | RpcCode::NotFound
            | RpcCode::AlreadyExists
            | RpcCode::FailedPrecondition
            | RpcCode::Aborted
            | RpcCode::Unimplemented => ErrorDisposition::LogOnly,
            _ => ErrorDisposition::Report,
        },
        RpcFailure::Other(_) => ErrorDisposition::Report,
    }
}

/// Failed-call hook for the RPC framework's interceptors.
#[derive(Clone)]
pub struct RpcErrorLogger {
    service: String,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl RpcErrorLogger {
    pub fn new(service: impl Into<String>, reporter: Option<Arc<dyn ErrorReporter>>) -> Self {
        Self {
            service: service.into(),
            reporter,
        }
    }

    /// Log `failure` and forward it to crash reporting when it is unexpected.
    ///
    /// Returns the disposition so interceptors can tell whether it was reported.
    pub fn call_failed(&self, method: &str, failure: RpcFailure) -> ErrorDisposition {
        match &failure {
            RpcFailure::Status { code, message } => {
                tracing::error!(method = %method, code = %code, message = %message, "RPC call failed");
            }
            RpcFailure::Other(err) => {
                tracing::error!(method = %method, error = %err, "Unknown error in RPC call");
            }
        }

        let disposition = classify_rpc_error(&failure);
        if disposition == ErrorDisposition::Report {
            if let Some(reporter) = &self.reporter {
                let context = ReportContext::new(self.service.clone()).with_rpc_method(method);
                reporter.report(&context, &failure);
            }
        }
        disposition
    }
}

impl fmt::Debug for RpcErrorLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcErrorLogger")
            .field("service", &self.service)
            .field("reporting", &self.reporter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingReporter {
        reports: Mutex<Vec<(ReportContext, String)>>,
    }

    impl ErrorReporter for RecordingReporter {
        fn report(&self, context: &ReportContext, error: &(dyn std::error::Error + Send + Sync + 'static)) {
            self.reports
                .lock()
                .unwrap()
                .push((context.clone(), error.to_string()));
        }
    }

    fn status(code: RpcCode) -> RpcFailure {
        RpcFailure::Status {
            code,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn client_errors_are_not_reported() {
        for code in [
            RpcCode::InvalidArgument,
            RpcCode::NotFound,
            RpcCode::AlreadyExists,
            RpcCode::FailedPrecondition,
            RpcCode::Aborted,
            RpcCode::Unimplemented,
        ] {
            assert_eq!(classify_rpc_error(&status(code)), ErrorDisposition::LogOnly, "{code}");
        }
    }

    #[test]
    fn server_errors_are_reported() {
        for code in [RpcCode::Internal, RpcCode::Unavailable, RpcCode::Unknown, RpcCode::DataLoss] {
            assert_eq!(classify_rpc_error(&status(code)), ErrorDisposition::Report, "{code}");
        }
        assert_eq!(
            classify_rpc_error(&RpcFailure::Other("disk full".into())),
            ErrorDisposition::Report
        );
    }

    #[test]
    fn logger_forwards_reportable_failures_with_context() {
        let reporter = Arc::new(RecordingReporter::default());
        let logger = RpcErrorLogger::new("billing", Some(reporter.clone()));

        logger.call_failed("/billing.Invoices/Get", status(RpcCode::NotFound));
        logger.call_failed("/billing.Invoices/Create", status(RpcCode::Internal));

        let reports = reporter.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].0,
            ReportContext::new("billing").with_rpc_method("/billing.Invoices/Create")
        );
        assert_eq!(reports[0].1, "rpc error: code = Internal desc = boom");
    }

    #[test]
    fn logger_without_reporter_still_classifies() {
        let logger = RpcErrorLogger::new("billing", None);
        assert_eq!(
            logger.call_failed("/billing.Invoices/Create", status(RpcCode::Internal)),
            ErrorDisposition::Report
        );
    }
}
