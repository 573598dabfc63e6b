//! Network foundation.
//!
//! # Data Flow
//! ```text
//! Configured address
//!     → listener.rs (parse, bind, log local address)
//!     → TcpListener handed to an HTTP or RPC serving task
//! ```
//!
//! # Design Decisions
//! - All listeners bind during startup, so a taken port fails the whole start
//!   before any traffic is accepted

pub mod listener;

pub use listener::{bind, BindError};
