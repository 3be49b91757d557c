//! Upload phase: replace every suite directory with the snapshot.

use crate::console::Status;
use crate::machine::ssh::{shell_quote, windows_path};
use crate::machine::{retry_until, IgnoreReason, MachineRuntime, MachineState, RemoteSession, RetryPolicy, TransferOptions};
use crate::models::Machine;
use crate::orchestrator::FleetEnv;
use futures::future::join_all;
use std::path::Path;

/// Remote command that deletes `directory` recursively.
pub fn remove_command(machine: &Machine, directory: &str) -> String {
    if machine.is_windows() {
        let dir = windows_path(directory);
        format!("if exist \"{}\" rmdir /s /q \"{}\"", dir, dir)
    } else {
        format!("rm -rf {}", shell_quote(directory))
    }
}

/// Push `snapshot` to every non-ignored machine. Returns false when any
/// transfer failed.
pub async fn upload_snapshot(env: &FleetEnv<'_>, machines: &mut [MachineRuntime], snapshot: &Path) -> bool {
    env.reporter.section("Upload source code...");

    let results = join_all(
        machines
            .iter_mut()
            .filter(|rt| !rt.is_ignored())
            .map(|rt| upload_one(env, rt, snapshot)),
    )
    .await;

    results.into_iter().all(|copied| copied)
}

async fn upload_one(env: &FleetEnv<'_>, rt: &mut MachineRuntime, snapshot: &Path) -> bool {
    let machine = rt.machine.clone();
    rt.transition(MachineState::Busy);

    let copied = match rt.session.as_deref() {
        Some(session) => push_directories(env, &machine, session, snapshot).await,
        None => {
            log::warn!("[Fleet] {}: no session to upload to", machine.name);
            false
        }
    };

    rt.transition(MachineState::Idle);
    if copied {
        env.reporter.status(&machine.name, "Upload", Status::Ok);
    } else {
        env.reporter.status(&machine.name, "Upload", Status::Error);
        rt.ignore(IgnoreReason::TransferFailed);
    }
    copied
}

async fn push_directories(
    env: &FleetEnv<'_>,
    machine: &Machine,
    session: &dyn RemoteSession,
    snapshot: &Path,
) -> bool {
    for directory in machine.upload_directories() {
        remove_directory(env, machine, session, &directory).await;

        let options = TransferOptions::recursive(env.settings.transfer.concurrency);
        if let Err(e) = session
            .push_tree(snapshot.to_path_buf(), directory.clone(), options)
            .await
        {
            log::error!("[Fleet] {}: upload to {} failed: {}", machine.name, directory, e);
            return false;
        }
        log::debug!("[Fleet] {}: uploaded {}", machine.name, directory);
    }
    true
}

/// Remote deletion is retried: Windows guests often report the directory
/// as busy. Giving up is not an error, the push decides.
async fn remove_directory(env: &FleetEnv<'_>, machine: &Machine, session: &dyn RemoteSession, directory: &str) {
    let timing = &env.settings.timing;
    let policy = RetryPolicy::new(timing.remove_attempts, timing.remove_interval());
    let command = remove_command(machine, directory);

    let result = retry_until(policy, |_| {
        let command = command.clone();
        async move {
            match session.exec(command, None).await {
                Ok(output) if output.success() => Ok(()),
                Ok(output) => Err(output.stderr),
                Err(e) => Err(e.to_string()),
            }
        }
    })
    .await;

    if let Err(e) = result {
        log::debug!("[Fleet] {}: could not remove {}: {}", machine.name, directory, e.trim());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(platform: &str) -> Machine {
        serde_json::from_str(&format!(r#"{{ "platform": "{}" }}"#, platform)).unwrap()
    }

    #[test]
    fn test_remove_command_posix() {
        assert_eq!(
            remove_command(&machine("linux"), "/home/debian/fleet"),
            "rm -rf '/home/debian/fleet'"
        );
    }

    #[test]
    fn test_remove_command_windows() {
        assert_eq!(
            remove_command(&machine("win32"), "C:/fleet"),
            "if exist \"C:\\fleet\" rmdir /s /q \"C:\\fleet\""
        );
    }
}
