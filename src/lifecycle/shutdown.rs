//! Shutdown coordination for the service.
//!
//! # Responsibilities
//! - Single-fire termination trigger shared by signal handlers and tests
//! - Fan out one drain branch per active subsystem
//! - Bound each branch by its own budget and join them all
//!
//! # Design Decisions
//! - Triggering twice is a no-op; only the first trigger starts a drain
//! - Branches run as separate tasks so a slow branch never delays a sibling
//! - A branch that exceeds its budget is abandoned and its task aborted
//! - Branch failures are reported in the [`DrainReport`], never escalated

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{join_all, BoxFuture};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::observability::metrics;

/// Graceful shutdown budget of the routing listener.
pub const ROUTING_SHUTDOWN_BUDGET: Duration = Duration::from_secs(20);

/// Graceful shutdown budget of the debug listener.
pub const DEBUG_SHUTDOWN_BUDGET: Duration = Duration::from_secs(3);

/// Graceful shutdown budgets of the HTTP listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainBudgets {
    pub routing: Duration,
    pub debug: Duration,
}

impl Default for DrainBudgets {
    fn default() -> Self {
        Self {
            routing: ROUTING_SHUTDOWN_BUDGET,
            debug: DEBUG_SHUTDOWN_BUDGET,
        }
    }
}

/// Single-fire termination trigger.
///
/// Clones share the same state. Every long-running task can wait on
/// [`triggered`](Self::triggered); only the first [`trigger`](Self::trigger) counts.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the trigger. Returns `true` only for the call that fired it.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the trigger has fired.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A drain branch failed or ran out of time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShutdownError {
    #[error("{branch} did not stop within {budget:?}")]
    TimedOut {
        branch: &'static str,
        budget: Duration,
    },

    #[error("{branch} failed to stop: {reason}")]
    Failed {
        branch: &'static str,
        reason: String,
    },

    #[error("{branch} panicked while stopping")]
    Panicked { branch: &'static str },
}

/// One shutdown operation in the drain fan-out.
pub struct DrainBranch {
    name: &'static str,
    budget: Option<Duration>,
    operation: BoxFuture<'static, Result<(), ShutdownError>>,
    on_timeout: Option<AbortHandle>,
}

impl DrainBranch {
    /// A branch that manages its own deadline.
    pub fn unbounded<F>(name: &'static str, operation: F) -> Self
    where
        F: std::future::Future<Output = Result<(), ShutdownError>> + Send + 'static,
    {
        Self {
            name,
            budget: None,
            operation: Box::pin(operation),
            on_timeout: None,
        }
    }

    /// A branch abandoned after `budget`.
    pub fn bounded<F>(name: &'static str, budget: Duration, operation: F) -> Self
    where
        F: std::future::Future<Output = Result<(), ShutdownError>> + Send + 'static,
    {
        Self {
            budget: Some(budget),
            ..Self::unbounded(name, operation)
        }
    }

    /// Abort this task if the branch exceeds its budget.
    pub fn abort_on_timeout(mut self, handle: AbortHandle) -> Self {
        self.on_timeout = Some(handle);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    async fn run(self) -> Result<(), ShutdownError> {
        let Some(budget) = self.budget else {
            return self.operation.await;
        };

        match tokio::time::timeout(budget, self.operation).await {
            Ok(result) => result,
            Err(_) => {
                if let Some(handle) = self.on_timeout {
                    handle.abort();
                }
                Err(ShutdownError::TimedOut {
                    branch: self.name,
                    budget,
                })
            }
        }
    }
}

impl std::fmt::Debug for DrainBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainBranch")
            .field("name", &self.name)
            .field("budget", &self.budget)
            .finish()
    }
}

/// Result of one drain branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOutcome {
    pub branch: &'static str,
    pub elapsed: Duration,
    pub result: Result<(), ShutdownError>,
}

/// Outcome of the whole drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub outcomes: Vec<BranchOutcome>,
}

impl DrainReport {
    /// True when every branch stopped in time without errors.
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.result.is_ok())
    }

    pub fn outcome(&self, branch: &str) -> Option<&BranchOutcome> {
        self.outcomes.iter().find(|outcome| outcome.branch == branch)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ShutdownError> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err())
    }
}

/// Run every branch concurrently and wait for all of them.
pub async fn drain(branches: Vec<DrainBranch>) -> DrainReport {
    let tasks = branches.into_iter().map(|branch| {
        let name = branch.name;
        let budget = branch.budget;
        tracing::debug!(branch = name, budget = ?budget, "Drain branch starting");

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let result = branch.run().await;
            (result, started.elapsed())
        });

        async move {
            let (result, elapsed) = match task.await {
                Ok(finished) => finished,
                Err(_) => (Err(ShutdownError::Panicked { branch: name }), Duration::ZERO),
            };

            match &result {
                Ok(()) => {
                    tracing::info!(branch = name, elapsed_ms = elapsed.as_millis() as u64, "Drain branch finished");
                    metrics::record_drain_branch(name, "ok", elapsed);
                }
                Err(err @ ShutdownError::TimedOut { .. }) => {
                    tracing::warn!(branch = name, error = %err, "Drain branch abandoned");
                    metrics::record_drain_branch(name, "timeout", elapsed);
                }
                Err(err) => {
                    tracing::error!(branch = name, error = %err, "Drain branch failed");
                    metrics::record_drain_branch(name, "error", elapsed);
                }
            }

            BranchOutcome {
                branch: name,
                elapsed,
                result,
            }
        }
    });

    DrainReport {
        outcomes: join_all(tasks).await,
    }
}
