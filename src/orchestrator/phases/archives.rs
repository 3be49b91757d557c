//! Build-archive check of `dist`: which artifacts already exist locally.

use crate::config::FleetSettings;
use crate::console::{Reporter, Status};
use crate::machine::{IgnoreReason, MachineRuntime};
use crate::models::{BuildSpec, Machine};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveStatus {
    Present,
    /// Missing, and only a manual machine can build it
    Manual,
    Missing,
}

impl ArchiveStatus {
    fn status(&self) -> Status {
        match self {
            ArchiveStatus::Present => Status::Ok,
            ArchiveStatus::Manual => Status::Manual,
            ArchiveStatus::Missing => Status::Missing,
        }
    }
}

/// Local artifact directory of one build suite:
/// `<artifact_root>/<version>/<platform>_<arch>`.
pub fn artifact_dir(settings: &FleetSettings, version: &str, machine: &Machine, build: &BuildSpec) -> PathBuf {
    settings
        .artifact_root()
        .join(version)
        .join(format!("{}_{}", machine.platform, build.arch))
}

/// Print the status of every (machine, suite) artifact and ignore the
/// machines with nothing left to build. Returns how many machines still
/// need a build.
pub fn check_archives(
    settings: &FleetSettings,
    reporter: &Reporter,
    machines: &mut [MachineRuntime],
    version: &str,
) -> usize {
    reporter.section("Checking build archives...");

    let mut needed_machines = 0;
    for rt in machines.iter_mut().filter(|rt| !rt.is_ignored()) {
        let machine = rt.machine.clone();
        let mut needed = false;

        for (suite, build) in &machine.builds {
            let binary = artifact_dir(settings, version, &machine, build).join(&settings.build.artifact_binary);
            let status = if binary.is_file() {
                ArchiveStatus::Present
            } else if machine.is_manual() {
                ArchiveStatus::Manual
            } else {
                ArchiveStatus::Missing
            };

            reporter.status(&machine.name, &format!("{} > Status", suite), status.status());
            needed |= status != ArchiveStatus::Present;
        }

        if needed {
            needed_machines += 1;
        } else {
            rt.ignore(IgnoreReason::AlreadyBuilt);
        }
    }

    needed_machines
}
