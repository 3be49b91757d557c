//! Collect phase of `dist`: pull every suite's build outputs.

use super::archives::artifact_dir;
use super::remote_join;
use crate::console::Status;
use crate::machine::{IgnoreReason, MachineRuntime, MachineState, RemoteSession, TransferOptions};
use crate::models::{BuildSpec, Machine};
use crate::orchestrator::FleetEnv;
use futures::future::join_all;
use regex::Regex;
use std::path::PathBuf;

/// Artifact directories gathered by the collect phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collected {
    /// Every pull succeeded
    pub success: bool,
    /// Directories to package: fresh pulls plus artifacts already built
    pub artifacts: Vec<PathBuf>,
}

/// Pull artifacts from every non-ignored machine. `lock` matches the file
/// names that must stay on the machine.
pub async fn collect_artifacts(
    env: &FleetEnv<'_>,
    machines: &mut [MachineRuntime],
    version: &str,
    lock: &Regex,
) -> Collected {
    env.reporter.section("Get build artifacts");

    let results = join_all(
        machines
            .iter_mut()
            .map(|rt| collect_one(env, rt, version, lock)),
    )
    .await;

    let mut collected = Collected {
        success: true,
        artifacts: Vec::new(),
    };
    for (copied, artifacts) in results {
        collected.success &= copied;
        collected.artifacts.extend(artifacts);
    }
    collected.artifacts.sort();
    collected.artifacts.dedup();
    collected
}

async fn collect_one(
    env: &FleetEnv<'_>,
    rt: &mut MachineRuntime,
    version: &str,
    lock: &Regex,
) -> (bool, Vec<PathBuf>) {
    let machine = rt.machine.clone();

    if let Some(reason) = rt.ignore_reason() {
        if reason == IgnoreReason::AlreadyBuilt {
            let existing = machine
                .builds
                .values()
                .map(|build| artifact_dir(env.settings, version, &machine, build))
                .collect();
            return (true, existing);
        }
        return (true, Vec::new());
    }

    rt.transition(MachineState::Busy);
    let pulls = match rt.session.as_deref() {
        Some(session) => {
            let pulls = machine
                .builds
                .values()
                .map(|build| pull_suite(env, &machine, session, build, version, lock));
            join_all(pulls).await
        }
        None => {
            log::warn!("[Fleet] {}: no session to collect from", machine.name);
            vec![None]
        }
    };
    rt.transition(MachineState::Idle);

    let copied = pulls.iter().all(Option::is_some);
    if copied {
        env.reporter.status(&machine.name, "Pack", Status::Ok);
        (true, pulls.into_iter().flatten().collect())
    } else {
        env.reporter.status(&machine.name, "Pack", Status::Error);
        rt.ignore(IgnoreReason::CollectFailed);
        (false, Vec::new())
    }
}

async fn pull_suite(
    env: &FleetEnv<'_>,
    machine: &Machine,
    session: &dyn RemoteSession,
    build: &BuildSpec,
    version: &str,
    lock: &Regex,
) -> Option<PathBuf> {
    let target = format!("{}_{}", machine.platform, build.arch);
    let remote = format!(
        "{}/{}",
        remote_join(&build.directory, &env.settings.build.artifact_subdir),
        target
    );
    let dest = artifact_dir(env.settings, version, machine, build);

    match tokio::fs::remove_dir_all(&dest).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            log::error!("[Fleet] cannot clear {}: {}", dest.display(), e);
            return None;
        }
    }

    let options = TransferOptions::flat(env.settings.transfer.concurrency).excluding(lock.clone());
    match session.pull_tree(remote.clone(), dest.clone(), options).await {
        Ok(()) => {
            log::debug!("[Fleet] {}: {} -> {}", machine.name, remote, dest.display());
            Some(dest)
        }
        Err(e) => {
            log::error!("[Fleet] {}: cannot pull {}: {}", machine.name, remote, e);
            None
        }
    }
}
