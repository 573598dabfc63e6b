//! HTTP server setup and serving tasks.
//!
//! # Responsibilities
//! - Collect application routes and the job trigger into the routing router
//! - Wire up middleware (sampling, timeout, request tracing)
//! - Serve a router on a bound listener until told to stop
//! - Turn a serving task into a bounded drain branch

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{middleware, routing::MethodRouter, Router};
use futures_util::FutureExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::collaborators::BoxError;
use crate::lifecycle::shutdown::{DrainBranch, Shutdown, ShutdownError};
use crate::lifecycle::startup::{supervise_listener, RuntimeListenerError};
use crate::observability::tracing::{sampling_middleware, SamplingHook};

/// Route table of the routing listener.
#[derive(Debug, Default)]
pub struct RoutingServer {
    router: Router,
    routes: usize,
}

impl RoutingServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an application route.
    pub fn route(&mut self, path: &str, handler: MethodRouter) {
        self.router = std::mem::take(&mut self.router).route(path, handler);
        self.routes += 1;
    }

    /// Mount the job trigger at `/crons/{service}/{job}`.
    pub fn mount_job_trigger(&mut self, service: &str, handler: MethodRouter) {
        let path = job_trigger_path(service);
        self.router = std::mem::take(&mut self.router).route(&path, handler);
    }

    /// Number of application routes, not counting the job trigger.
    pub fn route_count(&self) -> usize {
        self.routes
    }

    /// Build the final router with all middleware layers.
    #[allow(deprecated)]
    pub fn into_router(self, request_timeout: Duration, sampling: SamplingHook) -> Router {
        let mut router = self.router;
        if sampling.is_enabled() {
            router = router.layer(middleware::from_fn_with_state(sampling, sampling_middleware));
        }
        router
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
    }
}

/// Path the job trigger is mounted at for `service`.
pub fn job_trigger_path(service: &str) -> String {
    format!("/crons/{service}/{{job}}")
}

/// A running HTTP listener owned by the coordinator.
#[derive(Debug)]
pub struct HttpListenerHandle {
    name: &'static str,
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl HttpListenerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop serving immediately, dropping in-flight requests.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Drain branch that stops accepting, waits for in-flight requests, and
    /// aborts the serving task once `budget` runs out.
    pub fn into_drain_branch(self, budget: Duration) -> DrainBranch {
        let Self {
            name, stop, task, ..
        } = self;
        let abort = task.abort_handle();

        DrainBranch::bounded(name, budget, async move {
            let _ = stop.send(());
            task.await.map_err(|e| ShutdownError::Failed {
                branch: name,
                reason: e.to_string(),
            })
        })
        .abort_on_timeout(abort)
    }
}

/// Serve `router` on `listener` in a new task.
///
/// Serving that ends for any reason before `shutdown` fires is sent to `failures`.
pub fn spawn_http_listener(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    shutdown: Shutdown,
    failures: mpsc::UnboundedSender<RuntimeListenerError>,
) -> std::io::Result<HttpListenerHandle> {
    let local_addr = listener.local_addr()?;
    let (stop, stopped) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        tracing::info!(listener = name, address = %local_addr, "HTTP server starting");

        let serving = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stopped.await;
            })
            .into_future()
            .map(|served| served.map_err(BoxError::from));

        supervise_listener(name, serving, shutdown, failures).await;
    });

    Ok(HttpListenerHandle {
        name,
        local_addr,
        stop,
        task,
    })
}
