//! Fleet orchestration: phase pipeline over the Run Set.
//!
//! A [`RunContext`] owns everything one invocation mutates: the machine
//! runtimes, the run state and the reporter. Phases borrow it through
//! [`RunContext::split`], which hands out the shared environment and the
//! runtimes separately so every machine future gets exclusive access to its
//! own runtime and nothing else.

pub mod phases;
pub mod state;

pub use state::{FleetPhase, IgnoreSet, RunState};

use crate::config::FleetSettings;
use crate::console::{Reporter, Status};
use crate::error::{FleetError, Result};
use crate::machine::{IgnoreReason, LifecycleController, MachineRuntime};
use crate::models::{BuildMode, ExecOutput, Machine};
use crate::package::{read_version, validate_artifacts, Packager};
use crate::snapshot::{Snapshot, SnapshotBuilder, VcsExclusion};
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;

/// Per-invocation options from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: BuildMode,
    pub keyboard_layout: Option<String>,
    /// Boot machines so they outlive this process
    pub detach: bool,
}

/// Read-only part of a run, shared by every machine future of a phase.
#[derive(Clone, Copy)]
pub struct FleetEnv<'a> {
    pub settings: &'a FleetSettings,
    pub options: &'a RunOptions,
    pub lifecycle: &'a LifecycleController,
    pub reporter: &'a Reporter,
}

impl FleetEnv<'_> {
    /// Suffix appended to build commands for the run mode.
    pub fn build_flags(&self) -> &str {
        match self.options.mode {
            BuildMode::Release => &self.settings.build.release_flags,
            BuildMode::Debug => &self.settings.build.debug_flags,
        }
    }
}

/// Result of a `dist` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistOutcome {
    pub version: String,
    pub package_dir: PathBuf,
    /// Every machine phase succeeded
    pub success: bool,
}

pub struct RunContext {
    settings: Arc<FleetSettings>,
    options: RunOptions,
    lifecycle: LifecycleController,
    reporter: Reporter,
    machines: Vec<MachineRuntime>,
    state: RunState,
}

impl RunContext {
    pub fn new(
        settings: Arc<FleetSettings>,
        options: RunOptions,
        lifecycle: LifecycleController,
        reporter: Reporter,
        run_set: Vec<Arc<Machine>>,
    ) -> Self {
        RunContext {
            settings,
            options,
            lifecycle,
            reporter,
            machines: run_set.into_iter().map(MachineRuntime::new).collect(),
            state: RunState::new(),
        }
    }

    pub fn settings(&self) -> &FleetSettings {
        &self.settings
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn machines(&self) -> &[MachineRuntime] {
        &self.machines
    }

    pub fn runtime(&self, key: &str) -> Option<&MachineRuntime> {
        self.machines.iter().find(|rt| rt.key() == key)
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn ignore_set(&self) -> IgnoreSet {
        IgnoreSet::from_runtimes(&self.machines)
    }

    /// Shared environment plus exclusive access to the runtimes.
    pub fn split(&mut self) -> (FleetEnv<'_>, &mut [MachineRuntime]) {
        (
            FleetEnv {
                settings: &self.settings,
                options: &self.options,
                lifecycle: &self.lifecycle,
                reporter: &self.reporter,
            },
            &mut self.machines,
        )
    }

    fn advance(&mut self, phase: FleetPhase) {
        match self.state.transition_to(phase) {
            Ok(()) => log::info!("[Fleet] Phase: {}", phase),
            Err(e) => log::warn!("[Fleet] {}", e),
        }
    }

    fn fail(&mut self, error: &FleetError) {
        log::error!("[Fleet] {}", error);
        self.state.record_error(error.to_string());
    }

    /// Rebuild the source snapshot sent to the machines.
    pub fn snapshot(&mut self) -> Result<Snapshot> {
        self.reporter.section("Snapshot code...");

        let vcs = if self.settings.build.exclude_untracked {
            VcsExclusion::IgnoredAndUntracked
        } else {
            VcsExclusion::Ignored
        };
        let snapshot = SnapshotBuilder::new(&self.settings.paths.root, self.settings.snapshot.filter.clone())
            .vcs_exclusion(vcs)
            .build(&self.settings.snapshot_dir())?;
        Ok(snapshot)
    }

    async fn start_phase(&mut self) -> Result<()> {
        self.advance(FleetPhase::Start);
        let (env, machines) = self.split();
        let result = phases::start_machines(&env, machines).await;
        match result {
            Ok(started) => {
                self.state.degraded |= !started;
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn upload_phase(&mut self, snapshot: &Snapshot) {
        self.advance(FleetPhase::Upload);
        let (env, machines) = self.split();
        let uploaded = phases::upload_snapshot(&env, machines, &snapshot.root).await;
        self.state.degraded |= !uploaded;
    }

    async fn compile_phase(&mut self) {
        self.advance(FleetPhase::Compile);
        let (env, machines) = self.split();
        let built = phases::compile_suites(&env, machines).await;
        self.state.commands_ok &= built;
    }

    async fn stop_phase(&mut self, all: bool) -> bool {
        self.advance(FleetPhase::Stop);
        let (env, machines) = self.split();
        phases::stop_machines(&env, machines, all).await
    }

    async fn stop_started(&mut self) {
        if self.machines.iter().any(|rt| rt.started) {
            // Shutdown failures are reported, not counted against the run
            self.stop_phase(false).await;
        }
    }

    fn finish(&mut self) -> bool {
        let success = self.state.verdict(&self.ignore_set());
        if success {
            self.advance(FleetPhase::Completed);
        } else if self.state.phase != FleetPhase::Failed {
            self.advance(FleetPhase::Failed);
        }
        success
    }

    /// Build and test on every machine. Returns the overall verdict.
    pub async fn run_test(&mut self) -> Result<bool> {
        let snapshot = self.snapshot()?;

        if let Err(e) = self.start_phase().await {
            self.stop_started().await;
            return Err(e);
        }
        self.upload_phase(&snapshot).await;

        // Ignores past this point are failures of the run
        self.state.set_baseline(self.ignore_set());

        self.compile_phase().await;

        self.advance(FleetPhase::Test);
        let (env, machines) = self.split();
        let passed = phases::run_test_suites(&env, machines).await;
        self.state.commands_ok &= passed;

        self.stop_started().await;

        let success = self.finish();
        self.reporter
            .final_status(success, !self.ignore_set().is_empty());
        Ok(success)
    }

    /// Build every missing artifact, collect them and assemble the package.
    ///
    /// Packaging goes on with the artifacts that survived the machine phases;
    /// the outcome records whether every machine phase succeeded. A packaging
    /// or smoke-test failure is an error.
    pub async fn run_dist(&mut self) -> Result<DistOutcome> {
        let snapshot = self.snapshot()?;
        let version = read_version(&self.settings.paths.manifest)?;
        let lock = self.settings.build.lock_regex()?;

        self.reporter.section(&format!("Version: {}", version));
        let needed = phases::check_archives(&self.settings, &self.reporter, &mut self.machines, &version);
        self.state.set_baseline(self.ignore_set());

        if needed > 0 {
            if let Err(e) = self.start_phase().await {
                self.stop_started().await;
                return Err(e);
            }
            // Machines left out while starting do not fail the run
            self.state
                .extend_baseline(IgnoreSet::environmental(&self.machines));

            self.upload_phase(&snapshot).await;
            self.compile_phase().await;
        } else {
            log::info!("[Fleet] Every artifact already built, no machine needed");
        }

        self.advance(FleetPhase::Collect);
        let (env, machines) = self.split();
        let collected = phases::collect_artifacts(&env, machines, &version, &lock).await;
        self.state.degraded |= !collected.success;

        self.stop_started().await;

        let success = self.state.verdict(&self.ignore_set());
        if !success {
            log::warn!("[Fleet] Machine phases failed, packaging the surviving artifacts");
        }

        self.advance(FleetPhase::Package);
        let packaged = self.package(&collected.artifacts, &lock).await;
        let package_dir = match packaged {
            Ok(dir) => dir,
            Err(e) => {
                self.fail(&e);
                self.reporter.final_status(false, false);
                return Err(e);
            }
        };

        let success = self.finish() && success;
        self.reporter
            .final_status(success, !self.ignore_set().is_empty());
        Ok(DistOutcome {
            version,
            package_dir,
            success,
        })
    }

    async fn package(&self, artifacts: &[PathBuf], lock: &Regex) -> Result<PathBuf> {
        validate_artifacts(artifacts, lock)?;

        let packager = Packager::new(&self.settings);
        self.reporter.section("Prepare NPM package");
        let dist = packager.assemble(artifacts).await?;

        self.reporter.section("Test prebuild");
        packager.smoke_test(&dist).await?;
        Ok(dist)
    }

    /// Boot the machines and leave them running.
    pub async fn start_only(&mut self) -> Result<bool> {
        self.start_phase().await?;
        let success = self.finish();
        Ok(success)
    }

    /// Shut down every bootable machine of the Run Set.
    pub async fn stop_all(&mut self) -> Result<bool> {
        let stopped = self.stop_phase(true).await;
        self.state.degraded |= !stopped;
        Ok(self.finish())
    }

    /// Restore the `base` disk snapshot of every bootable machine.
    pub async fn reset(&mut self) -> Result<bool> {
        let engine = self.lifecycle.engine().clone();
        engine.preflight().await.map_err(FleetError::MissingTool)?;

        self.reporter.section("Restoring snapshots...");
        let mut success = true;
        for rt in self.machines.iter_mut() {
            let machine = rt.machine.clone();
            let Some(qemu) = &machine.qemu else {
                continue;
            };

            let machine_dir = self.settings.machine_dir(&machine.key);
            if !machine_dir.is_dir() {
                self.reporter.status(&machine.name, "Missing files", Status::Ignore);
                rt.ignore(IgnoreReason::MissingFiles);
                continue;
            }

            let result = engine
                .restore_snapshot(machine_dir, qemu.disk.clone(), BASE_SNAPSHOT.to_string())
                .await;
            match result {
                Ok(output) if output.success() => {
                    self.reporter.status(&machine.name, "Reset disk", Status::Ok);
                }
                Ok(output) => {
                    self.reporter.status(&machine.name, "Reset disk", Status::Error);
                    self.reporter.output(&ExecOutput {
                        stdout: String::new(),
                        ..output
                    });
                    success = false;
                }
                Err(e) => {
                    log::error!("[Fleet] {}: {}", machine.name, e);
                    self.reporter.status(&machine.name, "Reset disk", Status::Error);
                    success = false;
                }
            }
        }
        Ok(success)
    }

    /// Connection details of every bootable machine.
    pub fn info(&self) {
        for machine in self.machines.iter().map(|rt| &rt.machine) {
            let Some(qemu) = &machine.qemu else {
                continue;
            };
            let vnc = qemu
                .vnc_port
                .map_or_else(|| "none".to_string(), |port| port.to_string());

            self.reporter
                .line(&format!(">> {} ({})", machine.name, machine.key));
            self.reporter
                .line(&format!("  - SSH port: {}", qemu.ssh_port));
            self.reporter.line(&format!("  - VNC port: {}", vnc));
            self.reporter
                .line(&format!("  - Username: {}", qemu.username));
            self.reporter
                .line(&format!("  - Password: {}", qemu.password));
        }
    }
}

/// Disk snapshot restored by `reset`.
pub const BASE_SNAPSHOT: &str = "base";
