//! HTTP listeners.
//!
//! # Data Flow
//! ```text
//! Routing listener (:8080, when routing or the job trigger is enabled)
//!     → server.rs (timeout, request tracing, sampling middleware)
//!     → application routes / job trigger
//!
//! Debug listener (:8000, always on)
//!     → debug.rs (/health, /status, /metrics)
//! ```

pub mod debug;
pub mod server;

pub use debug::{debug_router, ServiceStatus};
pub use server::{spawn_http_listener, HttpListenerHandle, RoutingServer};
