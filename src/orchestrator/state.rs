//! Fleet run state and phase tracking.
//!
//! **Architecture**:
//! - `FleetPhase`: pipeline stage the whole fleet is in
//! - `IgnoreSet`: keys of the machines excluded from the rest of the run
//! - `RunState`: current phase, baseline Ignore Set and failure flags
//!
//! Phases only move forward. A run may skip phases (a `test` run never
//! collects, a fully built `dist` never boots) but never goes back.

use crate::machine::MachineRuntime;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FleetPhase {
    /// Snapshot taken, nothing touched yet
    Prepared,

    /// Boot or join every machine
    Start,

    /// Push the snapshot to every suite directory
    Upload,

    /// Run the build command of every build suite
    Compile,

    /// Run the test sequences
    Test,

    /// Pull build outputs back
    Collect,

    /// Shut down the machines this run started
    Stop,

    /// Assemble and smoke-test the package
    Package,

    Completed,

    Failed,
}

impl FleetPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FleetPhase::Prepared => "prepared",
            FleetPhase::Start => "start",
            FleetPhase::Upload => "upload",
            FleetPhase::Compile => "compile",
            FleetPhase::Test => "test",
            FleetPhase::Collect => "collect",
            FleetPhase::Stop => "stop",
            FleetPhase::Package => "package",
            FleetPhase::Completed => "completed",
            FleetPhase::Failed => "failed",
        }
    }

    /// Get all valid phase transitions FROM this phase.
    pub fn valid_next_phases(&self) -> Vec<FleetPhase> {
        const ORDER: [FleetPhase; 9] = [
            FleetPhase::Prepared,
            FleetPhase::Start,
            FleetPhase::Upload,
            FleetPhase::Compile,
            FleetPhase::Test,
            FleetPhase::Collect,
            FleetPhase::Stop,
            FleetPhase::Package,
            FleetPhase::Completed,
        ];

        match self {
            FleetPhase::Completed | FleetPhase::Failed => vec![],
            current => ORDER
                .iter()
                .copied()
                .filter(|next| next > current)
                .chain(std::iter::once(FleetPhase::Failed))
                .collect(),
        }
    }

    pub fn can_transition_to(&self, next: FleetPhase) -> bool {
        self.valid_next_phases().contains(&next)
    }
}

impl fmt::Display for FleetPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry keys of the ignored machines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet(BTreeSet<String>);

impl IgnoreSet {
    pub fn from_runtimes(machines: &[MachineRuntime]) -> Self {
        IgnoreSet(
            machines
                .iter()
                .filter(|rt| rt.is_ignored())
                .map(|rt| rt.key().to_string())
                .collect(),
        )
    }

    /// Machines ignored for an environmental reason only.
    pub fn environmental(machines: &[MachineRuntime]) -> Self {
        IgnoreSet(
            machines
                .iter()
                .filter(|rt| rt.ignore_reason().is_some_and(|reason| reason.is_environmental()))
                .map(|rt| rt.key().to_string())
                .collect(),
        )
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Mutable state of one orchestrator invocation.
#[derive(Debug, Clone)]
pub struct RunState {
    pub phase: FleetPhase,

    /// Ignore Set captured once the environmental exclusions are known
    pub baseline: Option<IgnoreSet>,

    /// A phase ignored a machine for a reason that is not environmental
    pub degraded: bool,

    /// Every remote command attempted so far exited zero
    pub commands_ok: bool,

    pub start_time: Instant,

    pub error: Option<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        RunState {
            phase: FleetPhase::Prepared,
            baseline: None,
            degraded: false,
            commands_ok: true,
            start_time: Instant::now(),
            error: None,
        }
    }

    /// Attempt to transition to the next phase.
    pub fn transition_to(&mut self, next_phase: FleetPhase) -> Result<(), String> {
        if !self.phase.can_transition_to(next_phase) {
            return Err(format!(
                "Invalid phase transition: {} -> {}",
                self.phase.as_str(),
                next_phase.as_str()
            ));
        }
        self.phase = next_phase;
        Ok(())
    }

    pub fn set_baseline(&mut self, set: IgnoreSet) {
        self.baseline = Some(set);
    }

    /// Add late environmental exclusions to the baseline.
    pub fn extend_baseline(&mut self, set: IgnoreSet) {
        match &mut self.baseline {
            Some(baseline) => baseline.0.extend(set.0),
            None => self.baseline = Some(set),
        }
    }

    /// Record an error and mark the run as failed.
    pub fn record_error(&mut self, error: String) {
        self.error = Some(error);
        self.phase = FleetPhase::Failed;
    }

    /// Overall verdict: no failed phase, no failed command, and the Ignore
    /// Set has exactly the members it had at the baseline.
    pub fn verdict(&self, current: &IgnoreSet) -> bool {
        let unchanged = self.baseline.as_ref().map_or(true, |baseline| baseline == current);
        !self.degraded && self.commands_ok && unchanged && self.error.is_none()
    }
}
