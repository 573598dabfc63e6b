//! Startup orchestration.
//!
//! # Responsibilities
//! - Collect the optional subsystems the service is configured with
//! - Validate that every enabled subsystem was wired
//! - Start the profiler, bind every listener, spawn one serving task each
//! - Wait for termination or a fatal listener error, then drain
//!
//! # Design Decisions
//! - Fail fast: configuration, profiler and bind errors abort startup before
//!   any listener serves, and a listener failing while running ends the
//!   service without draining
//! - The debug listener is always on
//! - Listener tasks are kept as handles and joined while draining

use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::MethodRouter;
use futures_util::FutureExt;
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::collaborators::{
    BoxError, ErrorReporter, Profiler, ProfilerConfig, RpcErrorLogger, RpcServer, TraceExporter,
};
use crate::config::schema::ServiceConfig;
use crate::config::subsystems::{Subsystem, SubsystemSet};
use crate::config::validation::{validate_activation, ConfigurationError};
use crate::http::{debug_router, spawn_http_listener, HttpListenerHandle, RoutingServer, ServiceStatus};
use crate::lifecycle::shutdown::{
    drain, DrainBranch, DrainBudgets, DrainReport, Shutdown, ShutdownError,
};
use crate::net::{self, BindError};
use crate::observability::metrics;
use crate::observability::tracing::SamplingHook;
use crate::sampling::{AdaptiveSampler, Clock, SystemClock};

/// Lifecycle states, in the only order they are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Configuring,
    Running,
    Draining,
    Terminated,
}

/// The service could not start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("failed to start the profiler: {0}")]
    Profiler(#[source] BoxError),

    #[error("failed to start the {listener} listener: {source}")]
    Spawn {
        listener: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// A listener failed while the service was running.
#[derive(Debug, Error)]
#[error("{listener} listener failed: {source}")]
pub struct RuntimeListenerError {
    pub listener: &'static str,
    #[source]
    pub source: BoxError,
}

/// Escalate a serving error, unless the service is already draining.
pub(crate) fn listener_failed(
    listener: &'static str,
    source: BoxError,
    shutdown: &Shutdown,
    failures: &mpsc::UnboundedSender<RuntimeListenerError>,
) {
    if shutdown.is_triggered() {
        tracing::warn!(listener, error = %source, "Listener failed while draining");
        return;
    }

    tracing::error!(listener, error = %source, "Listener failed, terminating service");
    metrics::record_listener_failure(listener);
    let _ = failures.send(RuntimeListenerError { listener, source });
}

/// Drive a listener's serving future and escalate however it ends early.
///
/// Returning (with or without an error) or panicking before the shutdown
/// trigger fired is a runtime listener failure.
pub(crate) async fn supervise_listener<F>(
    listener: &'static str,
    serving: F,
    shutdown: Shutdown,
    failures: mpsc::UnboundedSender<RuntimeListenerError>,
) where
    F: Future<Output = Result<(), BoxError>>,
{
    let source: BoxError = match AssertUnwindSafe(serving).catch_unwind().await {
        Ok(Ok(())) if shutdown.is_triggered() => {
            tracing::info!(listener, "Listener stopped");
            return;
        }
        Ok(Ok(())) => "stopped serving before shutdown was triggered".into(),
        Ok(Err(e)) => e,
        Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())).into(),
    };
    listener_failed(listener, source, &shutdown, &failures);
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

/// A service being configured.
///
/// Enable subsystems with the `configure_*` methods, register routes and RPC
/// services, then call [`start`](Self::start).
pub struct Service {
    config: ServiceConfig,
    subsystems: SubsystemSet,
    routing: RoutingServer,
    job_trigger: Option<MethodRouter>,
    rpc: Option<Arc<dyn RpcServer>>,
    error_reporter: Option<Arc<dyn ErrorReporter>>,
    profiler: Option<Arc<dyn Profiler>>,
    trace_exporter: Option<Arc<dyn TraceExporter>>,
    clock: Arc<dyn Clock>,
    metrics: Option<PrometheusHandle>,
    budgets: DrainBudgets,
    trace_project: String,
}

impl Service {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            subsystems: SubsystemSet::default(),
            routing: RoutingServer::new(),
            job_trigger: None,
            rpc: None,
            error_reporter: None,
            profiler: None,
            trace_exporter: None,
            clock: Arc::new(SystemClock),
            metrics: None,
            budgets: DrainBudgets::default(),
            trace_project: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.service.name
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn subsystems(&self) -> &SubsystemSet {
        &self.subsystems
    }

    /// Time source for the trace sampler.
    pub fn with_clock(&mut self, clock: Arc<dyn Clock>) -> &mut Self {
        self.clock = clock;
        self
    }

    /// Override the HTTP listener shutdown budgets.
    pub fn with_drain_budgets(&mut self, budgets: DrainBudgets) -> &mut Self {
        self.budgets = budgets;
        self
    }

    /// Serve `/metrics` from this handle on the debug listener.
    pub fn with_metrics(&mut self, handle: PrometheusHandle) -> &mut Self {
        self.metrics = Some(handle);
        self
    }

    /// Enable crash reporting. An empty DSN leaves it disabled.
    pub fn configure_error_reporter(&mut self, dsn: &str, reporter: Arc<dyn ErrorReporter>) -> &mut Self {
        if !dsn.is_empty() {
            self.subsystems.enable(Subsystem::ErrorReporting);
            self.error_reporter = Some(reporter);
        }
        self
    }

    /// Enable the HTTP routing listener. At least one route must be registered.
    pub fn configure_routing(&mut self) -> &mut Self {
        self.subsystems.enable(Subsystem::Routing);
        self
    }

    /// Register a route on the routing listener.
    pub fn route(&mut self, path: &str, handler: MethodRouter) -> Result<&mut Self, ConfigurationError> {
        self.subsystems.activate(Subsystem::Routing)?;
        self.routing.route(path, handler);
        Ok(self)
    }

    /// Enable the RPC listener. A server must be registered with [`register_rpc`](Self::register_rpc).
    pub fn configure_rpc(&mut self) -> &mut Self {
        self.subsystems.enable(Subsystem::Rpc);
        self
    }

    /// Register the RPC server with its services.
    pub fn register_rpc(&mut self, server: Arc<dyn RpcServer>) -> Result<&mut Self, ConfigurationError> {
        self.subsystems.activate(Subsystem::Rpc)?;
        if self.rpc.replace(server).is_some() {
            tracing::warn!("RPC server registered twice, keeping the last one");
        }
        Ok(self)
    }

    /// Failed-call hook to install in the RPC server's interceptors.
    pub fn rpc_error_logger(&self) -> RpcErrorLogger {
        RpcErrorLogger::new(self.name(), self.error_reporter.clone())
    }

    /// Mount the job trigger handler on the routing listener.
    pub fn configure_job_trigger(&mut self, handler: MethodRouter) -> &mut Self {
        self.subsystems.enable(Subsystem::JobTrigger);
        self.job_trigger = Some(handler);
        self
    }

    /// Enable the profiling agent. Ignored in local environments.
    pub fn configure_profiler(&mut self, profiler: Arc<dyn Profiler>) -> &mut Self {
        if self.config.service.environment.is_local() {
            tracing::debug!("Profiler disabled in local environment");
            return self;
        }
        self.subsystems.enable(Subsystem::Profiler);
        self.profiler = Some(profiler);
        self
    }

    /// Enable trace export with adaptive sampling.
    ///
    /// Ignored in local environments and when `project` is empty.
    pub fn configure_tracer(&mut self, project: &str, exporter: Arc<dyn TraceExporter>) -> &mut Self {
        if project.is_empty() || self.config.service.environment.is_local() {
            tracing::debug!("Trace export disabled");
            return self;
        }
        self.subsystems.enable(Subsystem::TraceExport);
        self.trace_project = project.to_string();
        self.trace_exporter = Some(exporter);
        self
    }

    /// Validate, bind every listener, and start serving.
    pub async fn start(self, shutdown: Shutdown) -> Result<RunningService, StartupError> {
        let Service {
            config,
            subsystems,
            routing,
            job_trigger,
            rpc,
            error_reporter: _,
            profiler,
            trace_exporter,
            clock,
            metrics,
            budgets,
            trace_project,
        } = self;
        let name = config.service.name.clone();

        validate_activation(&subsystems)?;

        if subsystems.is_enabled(Subsystem::ErrorReporting) {
            tracing::info!(service = %name, "Error reporting enabled");
        }

        if let Some(profiler) = &profiler {
            profiler
                .start(&ProfilerConfig {
                    service: name.clone(),
                    version: config.service.version.clone(),
                })
                .map_err(StartupError::Profiler)?;
            tracing::info!(service = %name, "Profiler enabled");
        }

        let sampling = if subsystems.is_enabled(Subsystem::TraceExport) {
            tracing::info!(project = %trace_project, "Trace export enabled");
            let sampler = AdaptiveSampler::with_clock(clock)
                .with_excluded_prefixes(config.sampling.excluded_prefixes.iter().cloned());
            SamplingHook::new(Arc::new(sampler))
        } else {
            SamplingHook::disabled()
        };

        let serve_routing =
            subsystems.is_enabled(Subsystem::Routing) || subsystems.is_enabled(Subsystem::JobTrigger);
        let routing_listener = match serve_routing {
            true => Some(net::bind("routing", &config.listeners.routing_address).await?),
            false => None,
        };
        let rpc_listener = match subsystems.is_enabled(Subsystem::Rpc) {
            true => Some(net::bind("rpc", &config.listeners.rpc_address).await?),
            false => None,
        };
        let debug_listener = net::bind("debug", &config.listeners.debug_address).await?;

        let (failures, failed) = mpsc::unbounded_channel();

        let routing = match routing_listener {
            Some(listener) => {
                let mut server = routing;
                if let Some(handler) = job_trigger {
                    server.mount_job_trigger(&name, handler);
                }
                let router = server.into_router(
                    Duration::from_secs(config.listeners.request_timeout_secs),
                    sampling.clone(),
                );
                let handle = spawn_http_listener("routing", listener, router, shutdown.clone(), failures.clone())
                    .map_err(|source| StartupError::Spawn {
                        listener: "routing",
                        source,
                    })?;
                Some(handle)
            }
            None => None,
        };

        let rpc = match (rpc_listener, rpc) {
            (Some(listener), Some(server)) => Some(
                RpcHandle::spawn(server, listener, sampling.clone(), shutdown.clone(), failures.clone())
                    .map_err(|source| StartupError::Spawn {
                        listener: "rpc",
                        source,
                    })?,
            ),
            _ => None,
        };

        let status = ServiceStatus {
            service: name.clone(),
            version: config.service.version.clone(),
            environment: config.service.environment.as_str(),
            subsystems: subsystems.enabled().map(Subsystem::as_str).collect(),
        };
        let debug = spawn_http_listener(
            "debug",
            debug_listener,
            debug_router(status, metrics),
            shutdown.clone(),
            failures,
        )
        .map_err(|source| StartupError::Spawn {
            listener: "debug",
            source,
        })?;

        tracing::info!(service = %name, state = ?LifecycleState::Running, "Instance initialized successfully!");

        Ok(RunningService {
            name,
            shutdown,
            routing,
            rpc,
            debug,
            trace_exporter,
            failed,
            sampling,
            budgets,
        })
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.config.service.name)
            .field("subsystems", &self.subsystems)
            .field("routes", &self.routing.route_count())
            .finish()
    }
}

/// The RPC serving task and the server it drives.
struct RpcHandle {
    server: Arc<dyn RpcServer>,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl RpcHandle {
    fn spawn(
        server: Arc<dyn RpcServer>,
        listener: TcpListener,
        sampling: SamplingHook,
        shutdown: Shutdown,
        failures: mpsc::UnboundedSender<RuntimeListenerError>,
    ) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let serving = server.clone();

        let task = tokio::spawn(async move {
            tracing::info!(listener = "rpc", address = %local_addr, "RPC server starting");
            supervise_listener("rpc", serving.serve(listener, sampling), shutdown, failures).await;
        });

        Ok(Self {
            server,
            local_addr,
            task,
        })
    }

    /// Graceful stop has no coordinator deadline; the server drains its own calls.
    fn into_drain_branch(self) -> DrainBranch {
        let Self { server, task, .. } = self;
        DrainBranch::unbounded("rpc", async move {
            server.graceful_stop().await;
            task.await.map_err(|e| ShutdownError::Failed {
                branch: "rpc",
                reason: e.to_string(),
            })
        })
    }
}

/// A started service.
pub struct RunningService {
    name: String,
    shutdown: Shutdown,
    routing: Option<HttpListenerHandle>,
    rpc: Option<RpcHandle>,
    debug: HttpListenerHandle,
    trace_exporter: Option<Arc<dyn TraceExporter>>,
    failed: mpsc::UnboundedReceiver<RuntimeListenerError>,
    sampling: SamplingHook,
    budgets: DrainBudgets,
}

impl RunningService {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trigger that starts the drain.
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Sampling hook installed on traced transports.
    pub fn sampling_hook(&self) -> &SamplingHook {
        &self.sampling
    }

    pub fn routing_addr(&self) -> Option<SocketAddr> {
        self.routing.as_ref().map(HttpListenerHandle::local_addr)
    }

    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.rpc.as_ref().map(|rpc| rpc.local_addr)
    }

    pub fn debug_addr(&self) -> SocketAddr {
        self.debug.local_addr()
    }

    /// Serve until the shutdown trigger fires, then drain every listener.
    ///
    /// Returns early with the error if any listener fails first; the remaining
    /// listeners are aborted without draining.
    pub async fn wait(mut self) -> Result<DrainReport, RuntimeListenerError> {
        tokio::select! {
            _ = self.shutdown.triggered() => {}
            Some(failure) = self.failed.recv() => {
                self.abort();
                return Err(failure);
            }
        }

        Ok(self.drain().await)
    }

    fn abort(&self) {
        if let Some(rpc) = &self.rpc {
            rpc.task.abort();
        }
        if let Some(routing) = &self.routing {
            routing.abort();
        }
        self.debug.abort();
    }

    async fn drain(self) -> DrainReport {
        tracing::info!(service = %self.name, state = ?LifecycleState::Draining, "Draining service");

        let mut branches = Vec::new();
        if let Some(rpc) = self.rpc {
            branches.push(rpc.into_drain_branch());
        }
        if let Some(exporter) = self.trace_exporter {
            branches.push(DrainBranch::unbounded("trace_exporter", async move {
                exporter.flush().await;
                Ok(())
            }));
        }
        if let Some(routing) = self.routing {
            branches.push(routing.into_drain_branch(self.budgets.routing));
        }
        branches.push(self.debug.into_drain_branch(self.budgets.debug));

        let report = drain(branches).await;
        tracing::info!(
            service = %self.name,
            state = ?LifecycleState::Terminated,
            clean = report.is_clean(),
            "Service terminated"
        );
        report
    }
}

impl std::fmt::Debug for RunningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningService")
            .field("name", &self.name)
            .field("routing", &self.routing_addr())
            .field("rpc", &self.rpc_addr())
            .field("debug", &self.debug_addr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn supervised<F>(serving: F, shutdown: &Shutdown) -> Option<RuntimeListenerError>
    where
        F: Future<Output = Result<(), BoxError>>,
    {
        let (failures, mut failed) = mpsc::unbounded_channel();
        supervise_listener("rpc", serving, shutdown.clone(), failures).await;
        failed.try_recv().ok()
    }

    #[tokio::test]
    async fn returning_before_shutdown_is_a_failure() {
        let failure = supervised(async { Ok::<(), BoxError>(()) }, &Shutdown::new()).await.unwrap();
        assert_eq!(failure.listener, "rpc");
        assert!(failure.to_string().contains("stopped serving"));
    }

    #[tokio::test]
    async fn returning_after_shutdown_is_clean() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        assert!(supervised(async { Ok::<(), BoxError>(()) }, &shutdown).await.is_none());
    }

    #[tokio::test]
    async fn serve_errors_while_draining_are_not_escalated() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let failure = supervised(async { Err::<(), _>(BoxError::from("connection reset")) }, &shutdown).await;
        assert!(failure.is_none());
    }

    #[tokio::test]
    async fn panics_become_failures() {
        let explode = true;
        let failure = supervised(
            async move {
                if explode {
                    panic!("transport state corrupted");
                }
                Ok::<(), BoxError>(())
            },
            &Shutdown::new(),
        )
        .await
        .unwrap();
        assert!(failure.to_string().contains("transport state corrupted"));
    }
}
