//! vmfleet: build and test a native project on a fleet of virtual machines.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Registry data model and remote command output
//! - **config**: Machine registry, selection and `fleet.toml` settings
//! - **snapshot**: Filtered, reproducible copies of the source tree
//! - **machine**: Per-machine lifecycle (boot, join, exec, transfer, shutdown)
//! - **orchestrator**: Phase pipeline over the selected machines
//! - **package**: Package assembly and smoke test for `dist`
//! - **console**: Operator-facing status lines
//! - **log_collector**: Decoupled run log behind the `log` facade
//! - **cli** / **commands**: Command-line surface and dispatch
//! - **mock**: Scripted engine and transport for tests

// Core foundational modules
pub mod error;
pub mod models;

pub mod config;
pub mod snapshot;

pub mod machine;
pub mod orchestrator;
pub mod package;

pub mod console;
pub mod log_collector;

pub mod cli;
pub mod commands;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export the log crate for macro usage
pub use log;

pub use log_collector::LogCollector;

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{FleetError, MachineError, PackageError, RegistryError, Result, SnapshotError};

pub use models::{BuildMode, BuildSpec, Endpoint, ExecOutput, Machine, QemuSpec, TestCommand, TestSpec};

pub use config::{select_machines, FleetSettings, Registry};

pub use machine::{IgnoreReason, LifecycleController, MachineRuntime, MachineState};

pub use orchestrator::{DistOutcome, FleetPhase, RunContext, RunOptions};

pub use commands::{Command, CommandOutcome, Fleet, Invocation};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn test_error_reexport() {
        let _: Result<i32> = Ok(42);
    }
}
