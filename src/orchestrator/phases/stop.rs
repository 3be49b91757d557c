//! Stop phase: power off bootable machines.
//!
//! Machines that this run started are stopped even when a later phase
//! ignored them, so no VM outlives a pipeline run.

use crate::console::Status;
use crate::machine::{MachineRuntime, ShutdownOutcome};
use crate::orchestrator::FleetEnv;
use futures::future::join_all;

/// Shut down the started machines, or every bootable machine when `all`.
/// Manual machines are never touched. Returns false when a shutdown failed.
pub async fn stop_machines(env: &FleetEnv<'_>, machines: &mut [MachineRuntime], all: bool) -> bool {
    env.reporter.section("Sending shutdown commands...");

    let results = join_all(
        machines
            .iter_mut()
            .filter(|rt| !rt.machine.is_manual())
            .filter(|rt| all || rt.started)
            .map(|rt| stop_one(env, rt)),
    )
    .await;

    results.into_iter().all(|stopped| stopped)
}

async fn stop_one(env: &FleetEnv<'_>, rt: &mut MachineRuntime) -> bool {
    let machine = rt.machine.clone();
    let Some(qemu) = &machine.qemu else {
        return true;
    };

    if rt.session.is_none() {
        if let Err(e) = env.lifecycle.join(rt, env.settings.timing.probe_attempts).await {
            log::debug!("[Fleet] {}: {}", machine.name, e);
            env.reporter.status(&machine.name, "Already down", Status::Ok);
            return true;
        }
    }

    match env.lifecycle.shutdown(rt, &qemu.shutdown).await {
        Ok(ShutdownOutcome::Stopped) => {
            env.reporter.status(&machine.name, "Stop", Status::Ok);
            true
        }
        Ok(ShutdownOutcome::AlreadyDown) => {
            env.reporter.status(&machine.name, "Already down", Status::Ok);
            true
        }
        Err(e) => {
            log::error!("[Fleet] {}: {}", machine.name, e);
            env.reporter.status(&machine.name, "Stop", Status::Error);
            false
        }
    }
}
