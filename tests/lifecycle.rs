//! End-to-end lifecycle tests over real sockets.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Path;
use axum::routing::get;
use service_runtime::collaborators::{ErrorReporter, ReportContext};
use service_runtime::config::{ConfigurationError, Environment, Subsystem};
use service_runtime::lifecycle::{DrainBudgets, ShutdownError, StartupError};
use service_runtime::sampling::ManualClock;
use service_runtime::{Service, Shutdown};

mod common;

use common::{test_config, CountingExporter, CountingProfiler, CountingRpcServer, ServeBehavior};
use tokio::sync::Notify;

const WAIT_LIMIT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn debug_listener_reports_health_and_status() {
    let service = Service::new(test_config("billing"));

    let shutdown = Shutdown::new();
    let running = service.start(shutdown.clone()).await.unwrap();
    assert!(running.routing_addr().is_none());
    assert!(running.rpc_addr().is_none());

    let base = format!("http://{}", running.debug_addr());
    let health = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(health.status(), 200);
    assert_eq!(health.text().await.unwrap(), "billing is ok\n");

    let status: serde_json::Value = reqwest::get(format!("{base}/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["service"], "billing");
    assert_eq!(status["subsystems"], serde_json::json!([]));

    shutdown.trigger();
    let report = tokio::time::timeout(WAIT_LIMIT, running.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(report.outcomes.len(), 1);
    assert!(report.outcome("debug").is_some());
}

#[tokio::test]
async fn drain_runs_once_when_triggered_twice() {
    let rpc = CountingRpcServer::new();
    let exporter = CountingExporter::new();

    let mut service = Service::new(test_config("billing"));
    service.configure_routing();
    service.route("/hello", get(|| async { "hello" })).unwrap();
    service.configure_rpc();
    service.register_rpc(rpc.clone()).unwrap();
    service.configure_tracer("billing-project", exporter.clone());

    let shutdown = Shutdown::new();
    let running = service.start(shutdown.clone()).await.unwrap();
    let routing = running.routing_addr().unwrap();
    assert!(running.rpc_addr().is_some());

    assert!(shutdown.trigger());
    assert!(!shutdown.trigger());

    let report = tokio::time::timeout(WAIT_LIMIT, running.wait())
        .await
        .unwrap()
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.outcomes.len(), 4);
    for branch in ["rpc", "trace_exporter", "routing", "debug"] {
        assert!(report.outcome(branch).is_some(), "missing {branch} branch");
    }
    assert_eq!(rpc.stops(), 1);
    assert_eq!(exporter.flushes(), 1);
    assert!(tokio::net::TcpStream::connect(routing).await.is_err());
}

#[tokio::test]
async fn unactivated_routing_fails_before_anything_binds() {
    let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let profiler = CountingProfiler::new();

    let mut config = test_config("billing");
    config.listeners.debug_address = occupied.local_addr().unwrap().to_string();

    let mut service = Service::new(config);
    service.configure_routing();
    service.configure_profiler(profiler.clone());

    let err = service.start(Shutdown::new()).await.unwrap_err();
    assert!(matches!(
        err,
        StartupError::Configuration(ConfigurationError::NotActivated {
            subsystem: Subsystem::Routing
        })
    ));
    assert_eq!(profiler.starts(), 0);
}

#[tokio::test]
async fn unactivated_rpc_is_rejected() {
    let mut service = Service::new(test_config("billing"));
    service.configure_rpc();

    let err = service.start(Shutdown::new()).await.unwrap_err();
    assert!(matches!(
        err,
        StartupError::Configuration(ConfigurationError::NotActivated {
            subsystem: Subsystem::Rpc
        })
    ));
}

#[tokio::test]
async fn registering_on_a_disabled_subsystem_fails() {
    let mut service = Service::new(test_config("billing"));

    let err = service.route("/hello", get(|| async { "hello" })).unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::NotEnabled {
            subsystem: Subsystem::Routing
        }
    );

    let err = service.register_rpc(CountingRpcServer::new()).unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::NotEnabled {
            subsystem: Subsystem::Rpc
        }
    );
}

#[tokio::test]
async fn occupied_port_is_a_bind_error() {
    let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = occupied.local_addr().unwrap().to_string();

    let mut config = test_config("billing");
    config.listeners.debug_address = address.clone();

    let err = Service::new(config).start(Shutdown::new()).await.unwrap_err();
    match err {
        StartupError::Bind(bind) => {
            assert_eq!(bind.listener, "debug");
            assert_eq!(bind.address, address);
            assert_eq!(bind.source.kind(), std::io::ErrorKind::AddrInUse);
        }
        other => panic!("expected bind error, got {other:?}"),
    }
}

#[tokio::test]
async fn profiler_failure_aborts_startup() {
    let profiler = CountingProfiler::failing();
    let mut service = Service::new(test_config("billing"));
    service.configure_profiler(profiler.clone());

    let err = service.start(Shutdown::new()).await.unwrap_err();
    assert!(matches!(err, StartupError::Profiler(_)));
    assert_eq!(profiler.starts(), 1);
}

#[tokio::test]
async fn local_environment_skips_profiler_and_tracer() {
    let profiler = CountingProfiler::new();
    let exporter = CountingExporter::new();

    let mut config = test_config("billing");
    config.service.environment = Environment::Local;

    let mut service = Service::new(config);
    service.configure_profiler(profiler.clone());
    service.configure_tracer("billing-project", exporter.clone());
    assert!(!service.subsystems().is_enabled(Subsystem::Profiler));
    assert!(!service.subsystems().is_enabled(Subsystem::TraceExport));

    let shutdown = Shutdown::new();
    let running = service.start(shutdown.clone()).await.unwrap();
    assert!(!running.sampling_hook().is_enabled());

    shutdown.trigger();
    tokio::time::timeout(WAIT_LIMIT, running.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profiler.starts(), 0);
    assert_eq!(exporter.flushes(), 0);
}

#[tokio::test]
async fn empty_dsn_or_project_leaves_subsystems_disabled() {
    let mut service = Service::new(test_config("billing"));
    service.configure_tracer("", CountingExporter::new());
    assert!(!service.subsystems().is_enabled(Subsystem::TraceExport));

    service.configure_error_reporter("", Arc::new(IgnoringReporter));
    assert!(!service.subsystems().is_enabled(Subsystem::ErrorReporting));

    service.configure_error_reporter("https://key@errors.example.com/1", Arc::new(IgnoringReporter));
    assert!(service.subsystems().is_enabled(Subsystem::ErrorReporting));
}

struct IgnoringReporter;

impl ErrorReporter for IgnoringReporter {
    fn report(&self, _context: &ReportContext, _error: &(dyn std::error::Error + Send + Sync + 'static)) {}
}

#[tokio::test]
async fn rpc_listener_ending_early_terminates_without_draining() {
    for behavior in [ServeBehavior::Fail, ServeBehavior::Return, ServeBehavior::Panic] {
        let rpc = CountingRpcServer::with_behavior(behavior);
        let exporter = CountingExporter::new();

        let mut service = Service::new(test_config("billing"));
        service.configure_rpc();
        service.register_rpc(rpc.clone()).unwrap();
        service.configure_tracer("billing-project", exporter.clone());

        let shutdown = Shutdown::new();
        let running = service.start(shutdown.clone()).await.unwrap();
        let debug = running.debug_addr();

        let err = tokio::time::timeout(WAIT_LIMIT, running.wait())
            .await
            .unwrap_or_else(|_| panic!("{behavior:?}: service kept running"))
            .unwrap_err();
        assert_eq!(err.listener, "rpc", "{behavior:?}");
        assert!(!shutdown.is_triggered());
        assert_eq!(rpc.stops(), 0);
        assert_eq!(exporter.flushes(), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            tokio::net::TcpStream::connect(debug).await.is_err(),
            "{behavior:?}: debug listener still bound"
        );
    }
}

#[tokio::test]
async fn hung_routing_request_is_abandoned_at_its_budget() {
    let hung = Arc::new(Notify::new());
    let slow = Arc::new(Notify::new());
    let exporter = CountingExporter::new();

    let mut service = Service::new(test_config("billing"));
    service.with_drain_budgets(DrainBudgets {
        routing: Duration::from_millis(500),
        debug: Duration::from_secs(3),
    });
    service.configure_routing();
    let entered = hung.clone();
    service
        .route(
            "/hang",
            get(move || {
                let entered = entered.clone();
                async move {
                    entered.notify_one();
                    std::future::pending::<&'static str>().await
                }
            }),
        )
        .unwrap();
    let entered = slow.clone();
    service
        .route(
            "/slow",
            get(move || {
                let entered = entered.clone();
                async move {
                    entered.notify_one();
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    "done"
                }
            }),
        )
        .unwrap();
    service.configure_tracer("billing-project", exporter.clone());

    let shutdown = Shutdown::new();
    let running = service.start(shutdown.clone()).await.unwrap();
    let base = format!("http://{}", running.routing_addr().unwrap());

    let health = reqwest::get(format!("http://{}/health", running.debug_addr()))
        .await
        .unwrap();
    assert_eq!(health.text().await.unwrap(), "billing is ok\n");

    let client = reqwest::Client::new();
    let _hanging = tokio::spawn(client.get(format!("{base}/hang")).send());
    let in_flight = tokio::spawn(client.get(format!("{base}/slow")).send());
    hung.notified().await;
    slow.notified().await;

    let started = Instant::now();
    shutdown.trigger();
    let report = tokio::time::timeout(WAIT_LIMIT, running.wait())
        .await
        .unwrap()
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(
        report.outcome("routing").unwrap().result,
        Err(ShutdownError::TimedOut {
            branch: "routing",
            budget: Duration::from_millis(500)
        })
    );
    assert_eq!(report.outcome("debug").unwrap().result, Ok(()));
    assert_eq!(report.outcome("trace_exporter").unwrap().result, Ok(()));
    assert_eq!(exporter.flushes(), 1);

    let response = in_flight.await.unwrap().unwrap();
    assert_eq!(response.text().await.unwrap(), "done");
}

#[tokio::test]
async fn traced_routes_engage_the_quota() {
    let clock = Arc::new(ManualClock::new());

    let mut service = Service::new(test_config("billing"));
    service.with_clock(clock.clone());
    service.configure_routing();
    service
        .route("/items/{id}", get(|Path(id): Path<u32>| async move { id.to_string() }))
        .unwrap();
    service.configure_tracer("billing-project", CountingExporter::new());

    let shutdown = Shutdown::new();
    let running = service.start(shutdown.clone()).await.unwrap();
    let base = format!("http://{}", running.routing_addr().unwrap());

    let client = reqwest::Client::new();
    for id in 0..22 {
        let response = client.get(format!("{base}/items/{id}")).send().await.unwrap();
        assert_eq!(response.status(), 200);
    }

    let sampler = running.sampling_hook().sampler().unwrap();
    assert_eq!(sampler.tracked_endpoints(), 1);
    let snapshot = sampler.snapshot("/items/{id}").unwrap();
    assert_eq!(snapshot.total, 22);
    assert!(snapshot.quota_engaged_since.is_some());

    shutdown.trigger();
    tokio::time::timeout(WAIT_LIMIT, running.wait())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn job_trigger_alone_starts_the_routing_listener() {
    let mut service = Service::new(test_config("billing"));
    service.configure_job_trigger(get(|Path(job): Path<String>| async move { format!("ran {job}") }));

    let shutdown = Shutdown::new();
    let running = service.start(shutdown.clone()).await.unwrap();
    let routing = running.routing_addr().unwrap();

    let body = reqwest::get(format!("http://{routing}/crons/billing/nightly"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ran nightly");

    shutdown.trigger();
    let report = tokio::time::timeout(WAIT_LIMIT, running.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(report.outcome("routing").is_some());
}
