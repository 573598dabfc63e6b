//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Configuring (startup.rs):
//!     configure_* / route / register_rpc → Service::start
//!     → activation check → profiler → bind routing, rpc, debug
//!
//! Running:
//!     signals.rs: SIGTERM/SIGINT → Shutdown::trigger
//!     listener failure → RunningService::wait returns the error
//!
//! Draining (shutdown.rs):
//!     rpc graceful stop ┐
//!     trace flush       ├─ concurrently → DrainReport → Terminated
//!     routing (20s)     │
//!     debug (3s)        ┘
//! ```
//!
//! # Design Decisions
//! - Startup is ordered and fails fast; nothing serves until everything bound
//! - Drain branches are independent and only the HTTP ones carry a deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{drain, DrainBranch, DrainBudgets, DrainReport, Shutdown, ShutdownError};
pub use startup::{LifecycleState, RunningService, RuntimeListenerError, Service, StartupError};
