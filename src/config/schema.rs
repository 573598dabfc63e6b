//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::sampling::sampler::DEFAULT_EXCLUDED_PREFIXES;

/// Root configuration for a service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service identity.
    pub service: ServiceSection,

    /// Listener bind addresses.
    pub listeners: ListenerConfig,

    /// Trace sampling settings.
    pub sampling: SamplingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Where the service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Developer machine: pretty logs, no profiler, no trace export.
    Local,
    #[default]
    Production,
}

impl Environment {
    pub fn is_local(self) -> bool {
        self == Self::Local
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Production => "production",
        }
    }
}

/// Service identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Name reported by the health endpoint, logs and the profiler.
    pub name: String,

    pub environment: Environment,

    /// Version reported to the profiler.
    pub version: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: "service".to_string(),
            environment: Environment::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// HTTP routing listener (also serves the job trigger).
    pub routing_address: String,

    /// RPC listener.
    pub rpc_address: String,

    /// Always-on debug listener (health, status, metrics).
    pub debug_address: String,

    /// Per-request timeout on the routing listener in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            routing_address: "0.0.0.0:8080".to_string(),
            rpc_address: "0.0.0.0:9000".to_string(),
            debug_address: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Trace sampling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Endpoint name prefixes that are never sampled nor counted.
    pub excluded_prefixes: Vec<String>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            excluded_prefixes: DEFAULT_EXCLUDED_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Install the Prometheus recorder and serve `/metrics` on the debug listener.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}
