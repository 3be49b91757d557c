//! Orchestrator phases: one module per pipeline stage.
//!
//! - **start**: boot or join every selected machine
//! - **upload**: push the snapshot into every suite directory
//! - **compile**: run the build suites
//! - **test**: run the test sequences
//! - **archives**: check which build artifacts already exist (`dist`)
//! - **collect**: pull build outputs into the artifact tree (`dist`)
//! - **stop**: shut down the machines this run started
//!
//! Every phase fans out one future per non-ignored machine and returns once
//! all of them settled. A phase never returns a per-machine error: failures
//! become ignore reasons and status lines, and the phase reports an
//! aggregated boolean.

pub mod archives;
pub mod collect;
pub mod compile;
pub mod start;
pub mod stop;
pub mod upload;

pub use archives::{artifact_dir, check_archives, ArchiveStatus};
pub use collect::{collect_artifacts, Collected};
pub use compile::compile_suites;
pub use start::{local_version, start_machines};
pub use stop::stop_machines;
pub use test::{run_test_suites, test_sequence, BUILD_STEP};
pub use upload::{remove_command, upload_snapshot};

use crate::console::Status;
use crate::models::{ExecOutput, Machine};
use crate::machine::RemoteSession;
use crate::orchestrator::FleetEnv;
use std::time::Instant;

/// Run one suite command and print its timed status line, plus the
/// captured output when it failed.
pub(crate) async fn run_reported(
    env: &FleetEnv<'_>,
    machine: &Machine,
    session: &dyn RemoteSession,
    action: &str,
    command: &str,
    cwd: &str,
    repeat: u32,
) -> ExecOutput {
    let started = Instant::now();
    let output = env
        .lifecycle
        .exec_on(machine, session, command, Some(cwd), repeat)
        .await;

    if output.success() {
        env.reporter
            .status(&machine.name, action, Status::Time(started.elapsed()));
    } else {
        log::debug!(
            "[Fleet] {} '{}' exited with {:?}",
            machine.name,
            command,
            output.code
        );
        env.reporter.status(&machine.name, action, Status::Error);
        env.reporter.output(&output);
    }

    output
}

/// `<directory>/<subdir>` with a single separator.
pub(crate) fn remote_join(directory: &str, subdir: &str) -> String {
    let subdir = subdir.trim_matches('/');
    if subdir.is_empty() {
        directory.to_string()
    } else {
        format!("{}/{}", directory.trim_end_matches('/'), subdir)
    }
}
