//! Shared fakes and helpers for lifecycle integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use service_runtime::collaborators::{
    BoxError, Profiler, ProfilerConfig, RpcServer, TraceExporter,
};
use service_runtime::observability::tracing::SamplingHook;
use service_runtime::ServiceConfig;

/// Config for `name` with every listener on an ephemeral loopback port.
pub fn test_config(name: &str) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.service.name = name.to_string();
    config.listeners.routing_address = "127.0.0.1:0".to_string();
    config.listeners.rpc_address = "127.0.0.1:0".to_string();
    config.listeners.debug_address = "127.0.0.1:0".to_string();
    config
}

/// How a [`CountingRpcServer`] behaves once serving starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServeBehavior {
    /// Serve until gracefully stopped.
    #[default]
    UntilStopped,
    /// Return an error right away.
    Fail,
    /// Return `Ok(())` right away.
    Return,
    /// Panic right away.
    Panic,
}

/// RPC server that holds its listener until stopped.
#[derive(Default)]
pub struct CountingRpcServer {
    behavior: ServeBehavior,
    stops: AtomicUsize,
    stopped: Notify,
}

impl CountingRpcServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_behavior(behavior: ServeBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            ..Self::default()
        })
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl RpcServer for CountingRpcServer {
    fn serve(&self, listener: TcpListener, _sampling: SamplingHook) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin(async move {
            let _listener = listener;
            match self.behavior {
                ServeBehavior::UntilStopped => {
                    self.stopped.notified().await;
                    Ok(())
                }
                ServeBehavior::Fail => Err("transport closed unexpectedly".into()),
                ServeBehavior::Return => Ok(()),
                ServeBehavior::Panic => panic!("rpc transport state corrupted"),
            }
        })
    }

    fn graceful_stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.stopped.notify_one();
        })
    }
}

#[derive(Default)]
pub struct CountingExporter {
    flushes: AtomicUsize,
}

impl CountingExporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl TraceExporter for CountingExporter {
    fn flush(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.flushes.fetch_add(1, Ordering::SeqCst);
        })
    }
}

#[derive(Default)]
pub struct CountingProfiler {
    fail: bool,
    starts: AtomicUsize,
}

impl CountingProfiler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl Profiler for CountingProfiler {
    fn start(&self, _config: &ProfilerConfig) -> Result<(), BoxError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err("profiler agent unreachable".into());
        }
        Ok(())
    }
}
