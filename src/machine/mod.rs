//! Single-machine lifecycle.
//!
//! [`Machine`] stays immutable; everything that changes during a run lives
//! in [`MachineRuntime`], owned by the orchestrator and written only by the
//! task handling that machine.

pub mod engine;
pub mod lifecycle;
pub mod retry;
pub mod session;
pub mod ssh;
pub mod state;

pub use engine::{LaunchOutcome, LaunchRequest, QemuEngine, VmEngine};
pub use lifecycle::{BootOptions, BootOutcome, LifecycleController, ShutdownOutcome};
pub use retry::{retry_until, RetryPolicy};
pub use session::{RemoteSession, SessionConnector, TransferOptions};
pub use ssh::SshConnector;
pub use state::MachineState;

use crate::models::Machine;
use std::fmt;
use std::sync::Arc;

/// Why a machine left the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoreReason {
    /// No local boot-support directory
    MissingFiles,
    /// Local machine files older than the registry requires
    VersionMismatch,
    /// Manual machine without connection endpoint
    NoEndpoint,
    /// Manual machine that never answered
    ManualUnreachable,
    /// Every build artifact already present
    AlreadyBuilt,
    BootFailed,
    TransferFailed,
    BuildFailed,
    CollectFailed,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::MissingFiles => "missing files",
            IgnoreReason::VersionMismatch => "version mismatch",
            IgnoreReason::NoEndpoint => "no endpoint",
            IgnoreReason::ManualUnreachable => "unreachable",
            IgnoreReason::AlreadyBuilt => "already built",
            IgnoreReason::BootFailed => "boot failed",
            IgnoreReason::TransferFailed => "transfer failed",
            IgnoreReason::BuildFailed => "build failed",
            IgnoreReason::CollectFailed => "collect failed",
        }
    }

    /// Pre-existing conditions of the environment, not failures of the run.
    pub fn is_environmental(&self) -> bool {
        matches!(
            self,
            IgnoreReason::MissingFiles
                | IgnoreReason::VersionMismatch
                | IgnoreReason::NoEndpoint
                | IgnoreReason::ManualUnreachable
                | IgnoreReason::AlreadyBuilt
        )
    }
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-time state of one machine.
pub struct MachineRuntime {
    pub machine: Arc<Machine>,
    pub state: MachineState,
    /// Booted by this run, so this run shuts it down
    pub started: bool,
    pub session: Option<Box<dyn RemoteSession>>,
    ignored: Option<IgnoreReason>,
}

impl MachineRuntime {
    pub fn new(machine: Arc<Machine>) -> Self {
        MachineRuntime {
            machine,
            state: MachineState::Down,
            started: false,
            session: None,
            ignored: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.machine.key
    }

    pub fn name(&self) -> &str {
        &self.machine.name
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored.is_some()
    }

    pub fn ignore_reason(&self) -> Option<IgnoreReason> {
        self.ignored
    }

    /// Exclude the machine from the rest of the run. The first reason sticks.
    pub fn ignore(&mut self, reason: IgnoreReason) {
        if self.ignored.is_none() {
            log::info!("[Fleet] {} ignored: {}", self.machine.name, reason);
            self.ignored = Some(reason);
        }
    }

    pub(crate) fn transition(&mut self, next: MachineState) {
        if self.state != next && !self.state.can_transition_to(next) {
            log::warn!(
                "[Machine] {}: unexpected transition {} -> {}",
                self.machine.name,
                self.state,
                next
            );
        }
        self.state = next;
    }
}

impl fmt::Debug for MachineRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineRuntime")
            .field("key", &self.machine.key)
            .field("state", &self.state)
            .field("started", &self.started)
            .field("connected", &self.session.is_some())
            .field("ignored", &self.ignored)
            .finish()
    }
}
