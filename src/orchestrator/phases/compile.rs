//! Compile phase: run every build suite, all suites of a machine at once.

use super::{remote_join, run_reported};
use crate::machine::{IgnoreReason, MachineRuntime, MachineState};
use crate::orchestrator::FleetEnv;
use futures::future::join_all;

/// Returns false when any build failed. A failed build ignores its machine.
pub async fn compile_suites(env: &FleetEnv<'_>, machines: &mut [MachineRuntime]) -> bool {
    env.reporter.section("Run build commands...");

    let results = join_all(
        machines
            .iter_mut()
            .filter(|rt| !rt.is_ignored())
            .map(|rt| compile_one(env, rt)),
    )
    .await;

    results.into_iter().all(|built| built)
}

async fn compile_one(env: &FleetEnv<'_>, rt: &mut MachineRuntime) -> bool {
    let machine = rt.machine.clone();
    rt.transition(MachineState::Busy);

    let built = match rt.session.as_deref() {
        Some(session) => {
            let flags = env.build_flags();
            let builds = machine.builds.iter().map(|(suite, build)| {
                let command = format!("{}{}", build.build, flags);
                let cwd = remote_join(&build.directory, &env.settings.build.remote_subdir);
                let action = format!("{} > Build", suite);
                let machine = &machine;
                async move {
                    run_reported(env, machine, session, &action, &command, &cwd, 1)
                        .await
                        .success()
                }
            });
            join_all(builds).await.into_iter().all(|ok| ok)
        }
        None => {
            log::warn!("[Fleet] {}: no session to build with", machine.name);
            false
        }
    };

    rt.transition(MachineState::Idle);
    if !built {
        rt.ignore(IgnoreReason::BuildFailed);
    }
    built
}
