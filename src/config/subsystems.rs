//! Optional subsystems and their wiring state.
//!
//! Routing and RPC must be activated (at least one route or service
//! registered) before the service may run; the others are ready as soon as
//! they are enabled.

use std::fmt;

use crate::config::validation::ConfigurationError;

/// An optional part of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Routing,
    Rpc,
    JobTrigger,
    ErrorReporting,
    Profiler,
    TraceExport,
}

impl Subsystem {
    pub const ALL: [Subsystem; 6] = [
        Subsystem::Routing,
        Subsystem::Rpc,
        Subsystem::JobTrigger,
        Subsystem::ErrorReporting,
        Subsystem::Profiler,
        Subsystem::TraceExport,
    ];

    /// Whether this subsystem must be activated before running.
    pub fn requires_activation(self) -> bool {
        matches!(self, Subsystem::Routing | Subsystem::Rpc)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Subsystem::Routing => "routing",
            Subsystem::Rpc => "rpc",
            Subsystem::JobTrigger => "job_trigger",
            Subsystem::ErrorReporting => "error_reporting",
            Subsystem::Profiler => "profiler",
            Subsystem::TraceExport => "trace_export",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SubsystemState {
    enabled: bool,
    activated: bool,
}

/// Enabled/activated flags for every [`Subsystem`].
#[derive(Debug, Clone, Default)]
pub struct SubsystemSet {
    states: [SubsystemState; Subsystem::ALL.len()],
}

impl SubsystemSet {
    /// Enable a subsystem. Enabling twice is a no-op.
    pub fn enable(&mut self, subsystem: Subsystem) {
        self.states[subsystem.index()].enabled = true;
    }

    /// Record that something was registered on `subsystem`.
    pub fn activate(&mut self, subsystem: Subsystem) -> Result<(), ConfigurationError> {
        let state = &mut self.states[subsystem.index()];
        if !state.enabled {
            return Err(ConfigurationError::NotEnabled { subsystem });
        }
        state.activated = true;
        Ok(())
    }

    pub fn is_enabled(&self, subsystem: Subsystem) -> bool {
        self.states[subsystem.index()].enabled
    }

    /// Subsystems that do not need activation count as activated.
    pub fn is_activated(&self, subsystem: Subsystem) -> bool {
        let state = self.states[subsystem.index()];
        state.activated || !subsystem.requires_activation()
    }

    /// Enabled subsystems in declaration order.
    pub fn enabled(&self) -> impl Iterator<Item = Subsystem> + '_ {
        Subsystem::ALL
            .into_iter()
            .filter(|subsystem| self.is_enabled(*subsystem))
    }
}
