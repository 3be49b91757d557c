//! Start phase: boot bootable machines, join manual ones.

use crate::console::Status;
use crate::error::FleetError;
use crate::machine::{BootOptions, BootOutcome, IgnoreReason, MachineRuntime};
use crate::orchestrator::FleetEnv;
use futures::future::join_all;
use std::path::Path;

/// Name of the file holding the version of the local machine files.
pub const VERSION_FILE: &str = "VERSION";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartResult {
    Ready,
    /// Ignored for an environmental reason
    Unavailable,
    Failed,
}

/// Version of the local machine files: first line of `VERSION`, 0 when
/// absent or unreadable.
pub fn local_version(machine_dir: &Path) -> u32 {
    std::fs::read_to_string(machine_dir.join(VERSION_FILE))
        .ok()
        .and_then(|content| content.trim().parse().ok())
        .unwrap_or(0)
}

/// Bring every non-ignored machine up.
///
/// Returns `Ok(false)` when a bootable machine failed to start, and
/// `Err(NoMachineAvailable)` when every machine of the run was left out for
/// environmental reasons.
pub async fn start_machines(env: &FleetEnv<'_>, machines: &mut [MachineRuntime]) -> Result<bool, FleetError> {
    let needs_engine = machines
        .iter()
        .any(|rt| !rt.is_ignored() && !rt.machine.is_manual());
    if needs_engine {
        env.lifecycle
            .engine()
            .preflight()
            .await
            .map_err(FleetError::MissingTool)?;
    }

    env.reporter.section("Starting up machines...");

    let total = machines.len();
    let results = join_all(
        machines
            .iter_mut()
            .filter(|rt| !rt.is_ignored())
            .map(|rt| start_one(env, rt)),
    )
    .await;

    let unavailable = results
        .iter()
        .filter(|r| **r == StartResult::Unavailable)
        .count();
    if total > 0 && unavailable == total {
        return Err(FleetError::NoMachineAvailable);
    }

    Ok(!results.contains(&StartResult::Failed))
}

async fn start_one(env: &FleetEnv<'_>, rt: &mut MachineRuntime) -> StartResult {
    let machine = rt.machine.clone();
    let name = machine.name.as_str();

    let Some(qemu) = &machine.qemu else {
        if machine.ssh.is_none() {
            env.reporter.status(name, "No endpoint", Status::Ignore);
            rt.ignore(IgnoreReason::NoEndpoint);
            return StartResult::Unavailable;
        }

        return match env.lifecycle.boot(rt, &BootOptions::default()).await {
            Ok(_) => {
                env.reporter.status(name, "Join", Status::Ok);
                StartResult::Ready
            }
            Err(e) => {
                log::warn!("[Fleet] {}: {}", name, e);
                env.reporter.status(name, "Join", Status::Ignore);
                rt.ignore(IgnoreReason::ManualUnreachable);
                StartResult::Unavailable
            }
        };
    };

    let machine_dir = env.settings.machine_dir(&machine.key);
    if !machine_dir.is_dir() {
        env.reporter.status(name, "Missing files", Status::Ignore);
        rt.ignore(IgnoreReason::MissingFiles);
        return StartResult::Unavailable;
    }

    let version = local_version(&machine_dir);
    if version < qemu.version {
        log::info!(
            "[Fleet] {}: local files at version {}, registry requires {}",
            name,
            version,
            qemu.version
        );
        env.reporter
            .status(name, "Machine version mismatch", Status::Ignore);
        rt.ignore(IgnoreReason::VersionMismatch);
        return StartResult::Unavailable;
    }

    let options = BootOptions {
        keyboard_layout: env.options.keyboard_layout.clone(),
        detach: env.options.detach,
        machine_dir,
    };

    match env.lifecycle.boot(rt, &options).await {
        Ok(BootOutcome::Started) => {
            let mode = qemu.accelerate.map_or("emulated", |accel| accel.as_str());
            env.reporter
                .status(name, &format!("Start ({})", mode), Status::Ok);
            StartResult::Ready
        }
        Ok(_) => {
            env.reporter.status(name, "Join", Status::Ok);
            StartResult::Ready
        }
        Err(e) => {
            log::error!("[Fleet] {}: {}", name, e);
            env.reporter.status(name, "Start", Status::Error);
            rt.ignore(IgnoreReason::BootFailed);
            StartResult::Failed
        }
    }
}
