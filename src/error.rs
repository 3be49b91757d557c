//! Unified error type hierarchy for vmfleet
//!
//! Provides structured error handling with RegistryError, MachineError,
//! SnapshotError, PackageError and the top-level FleetError.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Registry, settings and machine selection errors.
///
/// All of these are fatal and abort the invocation before any machine is touched.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in registry: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid settings file: {0}")]
    InvalidSettings(#[from] toml::de::Error),

    #[error("Registry validation failed: {0}")]
    ValidationFailed(String),

    #[error("Pattern '{0}' does not match any machine")]
    NoMatch(String),

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Machine name '{0}' is not valid")]
    InvalidMachineName(String),

    #[error("No machine available")]
    NoMachineAvailable,

    #[error("IO error during registry operations: {0}")]
    IoError(#[from] io::Error),
}

/// Errors raised by the lifecycle of a single machine.
///
/// These never escape a machine task: the fleet converts them into an
/// ignore reason and a status line.
#[derive(Error, Debug, Clone)]
pub enum MachineError {
    #[error("Failed to connect to {0}")]
    Unreachable(String),

    #[error("Failed to boot {machine}: {reason}")]
    BootFailed { machine: String, reason: String },

    #[error("Machine {0} has no open session")]
    NoSession(String),

    #[error("Machine {0} has no connection endpoint")]
    NoEndpoint(String),

    #[error("Shutdown of {0} timed out")]
    ShutdownTimeout(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Session error: {0}")]
    Session(String),
}

/// Snapshot builder errors.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Source root not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Version control query failed: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error during snapshot: {0}")]
    Io(#[from] io::Error),
}

/// Package assembly errors (fatal to `dist`).
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    #[error("Invalid manifest {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("Unexpected versioned file '{file}' in artifact {artifact}")]
    LockArtifact { artifact: PathBuf, file: String },

    #[error("Bundling {entry} failed: {reason}")]
    BundleFailed { entry: String, reason: String },

    #[error("Cannot move {from} to {to}: {reason}")]
    RelocationFailed { from: String, to: String, reason: String },

    #[error("Failed to use prebuild:\n{0}")]
    SmokeTestFailed(String),

    #[error("Snapshot error while packaging: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("IO error during packaging: {0}")]
    Io(#[from] io::Error),
}

/// Global error type for the fleet orchestrator.
#[derive(Error, Debug)]
pub enum FleetError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error("{0}")]
    MissingTool(String),

    #[error("No machine available")]
    NoMachineAvailable,

    #[error("The {0} command can only be used with one machine")]
    SingleMachineRequired(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FleetError {
    /// Get a user-facing error message suitable for the terminal
    pub fn user_message(&self) -> String {
        match self {
            FleetError::Registry(e) => format!("Configuration error: {}", e),
            FleetError::Snapshot(e) => format!("Could not snapshot source tree: {}", e),
            FleetError::Package(e) => format!("Packaging failed: {}", e),
            FleetError::MissingTool(msg) => msg.clone(),
            FleetError::NoMachineAvailable => "No machine available".to_string(),
            FleetError::SingleMachineRequired(cmd) => {
                format!("The {} command can only be used with one machine", cmd)
            }
            FleetError::Io(e) => format!("File operation failed: {}", e),
        }
    }
}

/// Top-level result type for fleet operations.
pub type Result<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match_display() {
        let err = RegistryError::NoMatch("debian_*".to_string());
        assert_eq!(err.to_string(), "Pattern 'debian_*' does not match any machine");
    }

    #[test]
    fn test_unreachable_display() {
        let err = MachineError::Unreachable("Debian x64".to_string());
        assert_eq!(err.to_string(), "Failed to connect to Debian x64");
    }

    #[test]
    fn test_registry_error_converts_to_fleet_error() {
        let err: FleetError = RegistryError::NoMachineAvailable.into();
        assert!(matches!(err, FleetError::Registry(RegistryError::NoMachineAvailable)));
        assert_eq!(err.user_message(), "Configuration error: No machine available");
    }

    #[test]
    fn test_smoke_failure_display_keeps_output() {
        let err = PackageError::SmokeTestFailed("cannot open shared object".to_string());
        assert!(err.to_string().contains("cannot open shared object"));
    }
}
