//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGTERM and SIGINT handlers
//! - Translate the first signal into the shutdown trigger
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Signals after the first are logged and ignored; the drain already running
//!   keeps its own deadlines

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;

/// Spawn a task that fires `shutdown` on SIGTERM or SIGINT.
pub fn listen_for_termination(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = watch_signals(&shutdown).await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    })
}

/// Fire the trigger on behalf of `signal`, logging whether it started the drain.
pub fn notify(shutdown: &Shutdown, signal: &'static str) -> bool {
    let first = shutdown.trigger();
    if first {
        tracing::info!(signal, "Caught OS signal, draining");
    } else {
        tracing::warn!(signal, "Caught OS signal while already draining, ignoring");
    }
    first
}

#[cfg(unix)]
async fn watch_signals(shutdown: &Shutdown) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    loop {
        let name = tokio::select! {
            Some(()) = terminate.recv() => "SIGTERM",
            Some(()) = interrupt.recv() => "SIGINT",
            else => return Ok(()),
        };
        notify(shutdown, name);
    }
}

#[cfg(not(unix))]
async fn watch_signals(shutdown: &Shutdown) -> std::io::Result<()> {
    loop {
        tokio::signal::ctrl_c().await?;
        notify(shutdown, "CTRL_C");
    }
}
