//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) / CLI overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!
//! Code wiring the service:
//!     → subsystems.rs (enable / activate optional subsystems)
//!     → validation.rs (enabled but never activated → ConfigurationError)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the service starts running
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod subsystems;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{Environment, ListenerConfig, ServiceConfig};
pub use subsystems::{Subsystem, SubsystemSet};
pub use validation::ConfigurationError;
