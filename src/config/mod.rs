//! Declarative inputs of a run.
//!
//! - `loader`: the machine registry (JSON, registry order preserved)
//! - `selector`: glob patterns to Run Set
//! - `settings`: `fleet.toml` paths, timings and packaging policy
//! - `validator`: registry and pattern validation

pub mod loader;
pub mod selector;
pub mod settings;
pub mod validator;

pub use loader::{detect_accelerator, Registry};
pub use selector::select_machines;
pub use settings::{
    BuildSettings, CommandTemplate, EntryScript, FleetSettings, PackageSettings, PathSettings,
    Relocation, SnapshotSettings, TimingSettings, TransferSettings,
};
pub use validator::{validate_machine, validate_machine_pattern};
