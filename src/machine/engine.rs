//! Virtual-machine engine seam.
//!
//! The controller never talks to QEMU directly: it hands a [`LaunchRequest`]
//! to a [`VmEngine`]. [`QemuEngine`] spawns real processes, the `mock` module
//! provides a scripted one for tests.

use crate::error::MachineError;
use crate::models::ExecOutput;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// One VM process launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub binary: String,
    pub args: Vec<String>,
    /// Machine directory holding the disk image
    pub cwd: PathBuf,
    /// Put the process in its own group so it outlives the controller
    pub detach: bool,
    /// How long to watch for an early exit
    pub settle: Duration,
}

/// What the process did during the settle delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Running,
    /// Exited before the settle delay elapsed (usually: already running)
    Exited(Option<i32>),
}

pub trait VmEngine: Send + Sync {
    /// Make sure the engine tools are installed.
    fn preflight(&self) -> BoxFuture<'static, Result<(), String>>;

    /// Spawn the VM process and wait for the settle delay.
    fn launch(&self, request: LaunchRequest) -> BoxFuture<'static, Result<LaunchOutcome, MachineError>>;

    /// Revert `disk` (in `machine_dir`) to its named internal snapshot.
    fn restore_snapshot(
        &self,
        machine_dir: PathBuf,
        disk: String,
        snapshot: String,
    ) -> BoxFuture<'static, Result<ExecOutput, MachineError>>;
}

/// Real QEMU engine.
#[derive(Debug, Clone, Default)]
pub struct QemuEngine {
    prefix: Option<PathBuf>,
}

impl QemuEngine {
    pub fn new(prefix: Option<PathBuf>) -> Self {
        QemuEngine { prefix }
    }

    /// Full path (or bare name for PATH lookup) of a QEMU tool.
    pub fn locate(&self, tool: &str) -> PathBuf {
        let file = if cfg!(windows) {
            format!("{}.exe", tool)
        } else {
            tool.to_string()
        };
        match &self.prefix {
            Some(prefix) => prefix.join(file),
            None => PathBuf::from(file),
        }
    }
}

async fn capture(mut command: Command) -> Result<ExecOutput, MachineError> {
    let output = command
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| MachineError::Session(e.to_string()))?;
    Ok(ExecOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    command.process_group(0);
}

#[cfg(not(unix))]
fn detach(_command: &mut Command) {}

fn spawn_error(binary: &Path, e: std::io::Error) -> MachineError {
    MachineError::BootFailed {
        machine: binary.display().to_string(),
        reason: e.to_string(),
    }
}

impl VmEngine for QemuEngine {
    fn preflight(&self) -> BoxFuture<'static, Result<(), String>> {
        let qemu_img = self.locate("qemu-img");
        Box::pin(async move {
            let mut command = Command::new(&qemu_img);
            command.arg("--version");
            match capture(command).await {
                Ok(output) if output.success() => {
                    log::debug!("[Engine] {}", output.stdout.lines().next().unwrap_or_default());
                    Ok(())
                }
                _ => Err("QEMU does not seem to be installed".to_string()),
            }
        })
    }

    fn launch(&self, request: LaunchRequest) -> BoxFuture<'static, Result<LaunchOutcome, MachineError>> {
        let binary = self.locate(&request.binary);
        Box::pin(async move {
            log::debug!(
                "[Engine] Launching {} {} in {}",
                binary.display(),
                request.args.join(" "),
                request.cwd.display()
            );

            let mut command = Command::new(&binary);
            command
                .args(&request.args)
                .current_dir(&request.cwd)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(false);
            if request.detach {
                detach(&mut command);
            }

            let mut child = command.spawn().map_err(|e| spawn_error(&binary, e))?;

            tokio::select! {
                status = child.wait() => {
                    let code = status.ok().and_then(|s| s.code());
                    log::debug!("[Engine] {} exited early with {:?}", binary.display(), code);
                    Ok(LaunchOutcome::Exited(code))
                }
                _ = tokio::time::sleep(request.settle) => {
                    // Reap the VM whenever it powers off
                    tokio::spawn(async move {
                        let status = child.wait().await;
                        log::debug!("[Engine] VM process ended: {:?}", status);
                    });
                    Ok(LaunchOutcome::Running)
                }
            }
        })
    }

    fn restore_snapshot(
        &self,
        machine_dir: PathBuf,
        disk: String,
        snapshot: String,
    ) -> BoxFuture<'static, Result<ExecOutput, MachineError>> {
        let qemu_img = self.locate("qemu-img");
        Box::pin(async move {
            let mut command = Command::new(&qemu_img);
            command
                .args(["snapshot", disk.as_str(), "-a", snapshot.as_str()])
                .current_dir(&machine_dir);
            capture(command).await
        })
    }
}
