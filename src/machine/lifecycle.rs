//! Boot, join, remote execution and shutdown of one machine.

use crate::config::TimingSettings;
use crate::error::MachineError;
use crate::machine::engine::{LaunchOutcome, LaunchRequest, VmEngine};
use crate::machine::retry::{retry_until, RetryPolicy};
use crate::machine::session::{RemoteSession, SessionConnector};
use crate::machine::{MachineRuntime, MachineState};
use crate::models::{ExecOutput, Machine};
use std::path::PathBuf;
use std::sync::Arc;

/// Per-run boot parameters.
#[derive(Debug, Clone, Default)]
pub struct BootOptions {
    pub keyboard_layout: Option<String>,
    /// Launch VMs in their own process group
    pub detach: bool,
    pub machine_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Launched by this run and joined
    Started,
    /// Launch failed or exited early, but the probe found it running
    AlreadyRunning,
    /// Manual machine joined
    Joined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Stopped,
    AlreadyDown,
}

/// Assemble the QEMU argument list: base arguments, keyboard layout, accelerator.
pub fn boot_arguments(machine: &Machine, keyboard_layout: Option<&str>) -> Vec<String> {
    let Some(qemu) = &machine.qemu else {
        return Vec::new();
    };

    let mut args = qemu.arguments.clone();
    if let Some(layout) = keyboard_layout {
        args.push("-k".to_string());
        args.push(layout.to_string());
    }
    if let Some(accel) = qemu.accelerate {
        args.push("-accel".to_string());
        args.push(accel.as_str().to_string());
    }
    args
}

/// Translate a suite directory for a Windows-hosted machine's shell.
pub fn windows_command(command: &str, cwd: &str) -> String {
    format!("cd \"{}\" && {}", cwd.replace('/', "\\"), command)
}

/// Drives [`MachineRuntime`]s through their lifecycle.
#[derive(Clone)]
pub struct LifecycleController {
    engine: Arc<dyn VmEngine>,
    connector: Arc<dyn SessionConnector>,
    timing: TimingSettings,
}

impl LifecycleController {
    pub fn new(
        engine: Arc<dyn VmEngine>,
        connector: Arc<dyn SessionConnector>,
        timing: TimingSettings,
    ) -> Self {
        LifecycleController {
            engine,
            connector,
            timing,
        }
    }

    pub fn engine(&self) -> &Arc<dyn VmEngine> {
        &self.engine
    }

    pub fn connector(&self) -> &Arc<dyn SessionConnector> {
        &self.connector
    }

    pub fn timing(&self) -> &TimingSettings {
        &self.timing
    }

    fn policy(&self, attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, self.timing.retry_interval())
    }

    /// Boot a machine, or join it when it is manual.
    ///
    /// A failed or short-lived launch is followed by a short probe: a machine
    /// that answers was already running and is not ours to stop.
    pub async fn boot(&self, rt: &mut MachineRuntime, options: &BootOptions) -> Result<BootOutcome, MachineError> {
        let machine = rt.machine.clone();
        let Some(qemu) = &machine.qemu else {
            self.join(rt, self.timing.manual_join_attempts).await?;
            return Ok(BootOutcome::Joined);
        };

        rt.transition(MachineState::Booting);
        let request = LaunchRequest {
            binary: qemu.binary.clone(),
            args: boot_arguments(&machine, options.keyboard_layout.as_deref()),
            cwd: options.machine_dir.clone(),
            detach: options.detach,
            settle: self.timing.settle(),
        };

        let launched = match self.engine.launch(request).await {
            Ok(LaunchOutcome::Running) => true,
            Ok(LaunchOutcome::Exited(code)) => {
                log::debug!("[Machine] {} exited during settle ({:?})", machine.name, code);
                false
            }
            Err(e) => {
                log::debug!("[Machine] {} launch failed: {}", machine.name, e);
                false
            }
        };

        if launched {
            match self.join(rt, self.timing.join_attempts).await {
                Ok(()) => {
                    rt.started = true;
                    rt.state = MachineState::Started;
                    rt.transition(MachineState::Connected);
                    return Ok(BootOutcome::Started);
                }
                Err(e) => log::debug!("[Machine] {} did not answer after boot: {}", machine.name, e),
            }
        }

        match self.join(rt, self.timing.probe_attempts).await {
            Ok(()) => {
                rt.started = false;
                rt.transition(MachineState::Connected);
                Ok(BootOutcome::AlreadyRunning)
            }
            Err(e) => {
                rt.transition(MachineState::JoinFailed);
                rt.transition(MachineState::Down);
                Err(e)
            }
        }
    }

    /// Open a session with at most `max_attempts` connection attempts.
    pub async fn join(&self, rt: &mut MachineRuntime, max_attempts: u32) -> Result<(), MachineError> {
        let machine = rt.machine.clone();
        let endpoint = machine
            .endpoint()
            .ok_or_else(|| MachineError::NoEndpoint(machine.name.clone()))?;
        let windows = machine.is_windows();

        let connector = &self.connector;
        let result = retry_until(self.policy(max_attempts), |attempt| {
            log::debug!(
                "[Machine] Connecting to {} ({}:{}), attempt {}/{}",
                machine.name,
                endpoint.host,
                endpoint.port,
                attempt,
                max_attempts.max(1)
            );
            connector.connect(endpoint.clone(), windows)
        })
        .await;

        match result {
            Ok(session) => {
                rt.session = Some(session);
                if rt.state != MachineState::Booting {
                    rt.transition(MachineState::Connected);
                }
                Ok(())
            }
            Err(e) => {
                log::debug!("[Machine] {}: {}", machine.name, e);
                Err(MachineError::Unreachable(machine.name.clone()))
            }
        }
    }

    /// Run a remote command in `cwd`, `repeat` times while it keeps succeeding.
    ///
    /// Never fails: transport problems come back as an output without exit code.
    pub async fn exec_remote(
        &self,
        rt: &mut MachineRuntime,
        command: &str,
        cwd: Option<&str>,
        repeat: u32,
    ) -> ExecOutput {
        let Some(session) = rt.session.as_deref() else {
            return ExecOutput::transport_failure(
                MachineError::NoSession(rt.machine.name.clone()).to_string(),
            );
        };

        let previous = rt.state;
        rt.state = MachineState::Busy;
        let output = self.exec_on(&rt.machine, session, command, cwd, repeat).await;
        rt.state = if previous.is_connected() { MachineState::Idle } else { previous };
        output
    }

    /// Same as [`exec_remote`](Self::exec_remote) on a borrowed session, so
    /// the suites of one machine can share it concurrently.
    pub async fn exec_on(
        &self,
        machine: &Machine,
        session: &dyn RemoteSession,
        command: &str,
        cwd: Option<&str>,
        repeat: u32,
    ) -> ExecOutput {
        let (line, cwd) = match cwd {
            Some(dir) if machine.is_windows() => (windows_command(command, dir), None),
            other => (command.to_string(), other.map(str::to_string)),
        };

        let mut output = ExecOutput::default();
        for _ in 0..repeat.max(1) {
            output = match session.exec(line.clone(), cwd.clone()).await {
                Ok(output) => output,
                Err(e) => ExecOutput::transport_failure(e.to_string()),
            };
            if !output.success() {
                break;
            }
        }
        output
    }

    /// Power a machine off and wait for its session to close.
    pub async fn shutdown(&self, rt: &mut MachineRuntime, command: &str) -> Result<ShutdownOutcome, MachineError> {
        let Some(session) = rt.session.take() else {
            rt.started = false;
            return Ok(ShutdownOutcome::AlreadyDown);
        };
        rt.transition(MachineState::ShuttingDown);

        let race = async {
            let exec = session.exec(command.to_string(), None);
            let closed = session.wait_closed();
            tokio::select! {
                _ = closed => Ok::<(), MachineError>(()),
                result = exec => {
                    result?;
                    session.wait_closed().await;
                    Ok(())
                }
            }
        };

        let result = match tokio::time::timeout(self.timing.shutdown_timeout(), race).await {
            Ok(Ok(())) => Ok(ShutdownOutcome::Stopped),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MachineError::ShutdownTimeout(rt.machine.name.clone())),
        };

        rt.started = false;
        rt.transition(MachineState::Down);
        result
    }
}
