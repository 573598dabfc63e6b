//! Service runtime host.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!                 │                  SERVICE                      │
//!                 │                                               │
//!   HTTP  ───────▶│ routing :8080 ─▶ sampling ─▶ routes, /crons   │
//!   RPC   ───────▶│ rpc     :9000 ─▶ sampling ─▶ services         │
//!   Ops   ───────▶│ debug   :8000 ─▶ /health /status /metrics     │
//!                 │                                               │
//!                 │  lifecycle: configure → start → wait → drain  │
//!                 └──────────────────────────────────────────────┘
//! ```
//!
//! Runs a minimal service with a single route until SIGTERM or SIGINT.

use std::path::PathBuf;
use std::process::ExitCode;

use axum::routing::get;
use clap::Parser;

use service_runtime::config::{load_config, ServiceConfig};
use service_runtime::lifecycle::signals;
use service_runtime::observability::{logging, metrics};
use service_runtime::{Service, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "service-runtime")]
#[command(about = "Run a service with coordinated startup and graceful drain")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the service name from the configuration
    #[arg(long)]
    service_name: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => ServiceConfig::default(),
    };
    if let Some(name) = cli.service_name {
        config.service.name = name;
    }

    logging::init(config.service.environment, &config.observability.log_level);

    tracing::info!(
        service = %config.service.name,
        version = %config.service.version,
        environment = config.service.environment.as_str(),
        "service-runtime starting"
    );

    let metrics_handle = match config.observability.metrics_enabled {
        true => match metrics::install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install metrics recorder");
                None
            }
        },
        false => None,
    };

    let name = config.service.name.clone();
    let mut service = Service::new(config);
    if let Some(handle) = metrics_handle {
        service.with_metrics(handle);
    }
    service.configure_routing();
    if let Err(e) = service.route("/", get(move || async move { format!("{name}\n") })) {
        tracing::error!(error = %e, "Failed to register route");
        return ExitCode::FAILURE;
    }

    let shutdown = Shutdown::new();
    signals::listen_for_termination(shutdown.clone());

    let running = match service.start(shutdown).await {
        Ok(running) => running,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start service");
            return ExitCode::FAILURE;
        }
    };

    match running.wait().await {
        Ok(report) => {
            tracing::info!(clean = report.is_clean(), "Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Service terminated by listener failure");
            ExitCode::FAILURE
        }
    }
}
