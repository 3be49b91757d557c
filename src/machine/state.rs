//! Lifecycle state of a single machine.
//!
//! `Down → Booting → {Started, JoinFailed} → Connected → {Busy, Idle} → ShuttingDown → Down`

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MachineState {
    /// No process launched by us and no session
    #[default]
    Down,

    /// VM process launched, waiting for the settle delay and first join
    Booting,

    /// Process launched and a session answered
    Started,

    /// Boot and probe both failed
    JoinFailed,

    /// Session open, nothing running
    Connected,

    /// A remote command or transfer is in flight
    Busy,

    /// Session open, last operation settled
    Idle,

    /// Shutdown command issued, waiting for the session to close
    ShuttingDown,
}

impl MachineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Down => "down",
            MachineState::Booting => "booting",
            MachineState::Started => "started",
            MachineState::JoinFailed => "join_failed",
            MachineState::Connected => "connected",
            MachineState::Busy => "busy",
            MachineState::Idle => "idle",
            MachineState::ShuttingDown => "shutting_down",
        }
    }

    /// Get all valid transitions FROM this state.
    pub fn valid_next_states(&self) -> Vec<MachineState> {
        match self {
            // Manual or already-running machines join without booting
            MachineState::Down => vec![MachineState::Booting, MachineState::Connected, MachineState::JoinFailed],
            MachineState::Booting => vec![MachineState::Started, MachineState::Connected, MachineState::JoinFailed],
            MachineState::Started => vec![MachineState::Connected],
            MachineState::JoinFailed => vec![MachineState::Down],
            MachineState::Connected => vec![MachineState::Busy, MachineState::Idle, MachineState::ShuttingDown, MachineState::Down],
            MachineState::Busy => vec![MachineState::Idle, MachineState::Down],
            MachineState::Idle => vec![MachineState::Busy, MachineState::ShuttingDown, MachineState::Down],
            MachineState::ShuttingDown => vec![MachineState::Down],
        }
    }

    pub fn can_transition_to(&self, next: MachineState) -> bool {
        self.valid_next_states().contains(&next)
    }

    /// A session is expected to be open in this state.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            MachineState::Connected | MachineState::Busy | MachineState::Idle
        )
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
