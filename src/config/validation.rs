//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation of the config file (serde handles syntactic)
//! - Validate listener addresses (parseable, no two listeners on one address)
//! - Check that every enabled subsystem was wired before the service runs
//!
//! # Design Decisions
//! - File validation returns all errors, not just the first
//! - Activation validation runs exactly once, at the transition to running,
//!   and fails before any listener binds

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::subsystems::{Subsystem, SubsystemSet};

/// A semantic problem in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("service name must not be empty")]
    EmptyServiceName,

    #[error("{field} is not a valid socket address: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{first} and {second} share the address {address}")]
    DuplicateAddress {
        first: &'static str,
        second: &'static str,
        address: SocketAddr,
    },

    #[error("sampling.excluded_prefixes must not contain empty prefixes")]
    EmptyExcludedPrefix,
}

/// A subsystem was wired incorrectly by the code configuring the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Enabled, but nothing was ever registered on it.
    #[error("{subsystem} is enabled but nothing was registered on it")]
    NotActivated { subsystem: Subsystem },

    /// Used before being enabled.
    #[error("{subsystem} must be enabled before it can be used")]
    NotEnabled { subsystem: Subsystem },
}

/// Validate a loaded configuration file.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service.name.trim().is_empty() {
        errors.push(ValidationError::EmptyServiceName);
    }

    let listeners = [
        ("listeners.routing_address", &config.listeners.routing_address),
        ("listeners.rpc_address", &config.listeners.rpc_address),
        ("listeners.debug_address", &config.listeners.debug_address),
    ];

    let mut parsed: Vec<(&'static str, SocketAddr)> = Vec::new();
    for (field, value) in listeners {
        match value.parse::<SocketAddr>() {
            Ok(address) => {
                // Port 0 asks the OS for a fresh port, so it never collides.
                if address.port() != 0 {
                    if let Some(&(first, _)) = parsed.iter().find(|(_, seen)| *seen == address) {
                        errors.push(ValidationError::DuplicateAddress {
                            first,
                            second: field,
                            address,
                        });
                    }
                }
                parsed.push((field, address));
            }
            Err(_) => errors.push(ValidationError::InvalidAddress {
                field,
                value: value.clone(),
            }),
        }
    }

    if config
        .sampling
        .excluded_prefixes
        .iter()
        .any(|prefix| prefix.is_empty())
    {
        errors.push(ValidationError::EmptyExcludedPrefix);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Fail if any subsystem that needs explicit wiring is enabled but not activated.
pub fn validate_activation(subsystems: &SubsystemSet) -> Result<(), ConfigurationError> {
    match Subsystem::ALL
        .into_iter()
        .find(|subsystem| subsystems.is_enabled(*subsystem) && !subsystems.is_activated(*subsystem))
    {
        Some(subsystem) => Err(ConfigurationError::NotActivated { subsystem }),
        None => Ok(()),
    }
}
