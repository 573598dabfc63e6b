//! TCP listener binding.
//!
//! # Responsibilities
//! - Parse configured listener addresses
//! - Bind every listener before any serving task starts
//! - Report which listener failed to bind, and where

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

/// A listener could not acquire its address.
#[derive(Debug, Error)]
#[error("failed to bind {listener} listener on {address}: {source}")]
pub struct BindError {
    pub listener: &'static str,
    pub address: String,
    #[source]
    pub source: std::io::Error,
}

/// Bind the listener named `listener` on `address`.
pub async fn bind(listener: &'static str, address: &str) -> Result<TcpListener, BindError> {
    let bind_error = |source| BindError {
        listener,
        address: address.to_string(),
        source,
    };

    let addr: SocketAddr = address.parse().map_err(|e| {
        bind_error(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
    })?;

    let tcp = TcpListener::bind(addr).await.map_err(bind_error)?;
    let local_addr = tcp.local_addr().map_err(bind_error)?;

    tracing::info!(listener, address = %local_addr, "Listener bound");
    Ok(tcp)
}
