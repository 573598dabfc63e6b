//! Service runtime: lifecycle coordination and adaptive trace sampling for
//! network services.

pub mod collaborators;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod sampling;

pub use config::schema::ServiceConfig;
pub use lifecycle::{RunningService, Service, Shutdown};
pub use sampling::AdaptiveSampler;
