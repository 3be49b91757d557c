//! Command dispatch: one handler per [`Command`] variant.

use crate::config::{select_machines, FleetSettings, Registry};
use crate::console::Reporter;
use crate::error::{FleetError, Result};
use crate::machine::engine::{QemuEngine, VmEngine};
use crate::machine::session::SessionConnector;
use crate::machine::ssh::open_interactive;
use crate::machine::{LifecycleController, SshConnector};
use crate::models::{BuildMode, Machine};
use crate::orchestrator::{DistOutcome, RunContext, RunOptions};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Test,
    Debug,
    Dist,
    Start,
    Stop,
    Info,
    Ssh,
    Reset,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Test => "test",
            Command::Debug => "debug",
            Command::Dist => "dist",
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Info => "info",
            Command::Ssh => "ssh",
            Command::Reset => "reset",
        }
    }

    /// Whether the command talks to machines over SSH.
    pub fn needs_ssh(&self) -> bool {
        !matches!(self, Command::Info | Command::Reset)
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    pub patterns: Vec<String>,
    pub keyboard_layout: Option<String>,
    pub accelerate: bool,
}

/// What a command produced.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub success: bool,
    pub dist: Option<DistOutcome>,
    pub reporter: Reporter,
}

/// Everything a command needs besides its arguments.
pub struct Fleet {
    settings: Arc<FleetSettings>,
    registry: Registry,
    engine: Arc<dyn VmEngine>,
    connector: Arc<dyn SessionConnector>,
    capture: bool,
}

impl Fleet {
    /// Fleet driving real QEMU processes over the system SSH client.
    pub fn new(settings: Arc<FleetSettings>, registry: Registry) -> Self {
        let engine = Arc::new(QemuEngine::new(settings.paths.qemu_prefix.clone()));
        Fleet {
            settings,
            registry,
            engine,
            connector: Arc::new(SshConnector),
            capture: false,
        }
    }

    pub fn with_tools(mut self, engine: Arc<dyn VmEngine>, connector: Arc<dyn SessionConnector>) -> Self {
        self.engine = engine;
        self.connector = connector;
        self
    }

    /// Record console lines instead of printing them.
    pub fn capturing(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn run(&self, invocation: &Invocation) -> Result<CommandOutcome> {
        let run_set = select_machines(&self.registry, &invocation.patterns)?;
        let names: Vec<&str> = run_set.iter().map(|m| m.name.as_str()).collect();
        let reporter = if self.capture {
            Reporter::capturing(names.iter().copied())
        } else {
            Reporter::new(names.iter().copied())
        };

        reporter.line(&format!("Machines: {}", names.join(", ")));
        reporter.line("");
        log::info!(
            "[Fleet] {} on {} machine(s)",
            invocation.command.as_str(),
            run_set.len()
        );

        if invocation.command.needs_ssh() {
            self.connector
                .preflight()
                .await
                .map_err(FleetError::MissingTool)?;
        }

        let mut outcome = CommandOutcome {
            success: false,
            dist: None,
            reporter: reporter.clone(),
        };
        let mut ctx = self.context(invocation, reporter, run_set.clone());

        match invocation.command {
            Command::Test | Command::Debug => {
                outcome.success = ctx.run_test().await?;
            }
            Command::Dist => {
                let dist = ctx.run_dist().await?;
                outcome.success = dist.success;
                outcome.dist = Some(dist);
            }
            Command::Start => {
                outcome.success = ctx.start_only().await?;
            }
            Command::Stop => {
                outcome.success = ctx.stop_all().await?;
            }
            Command::Info => {
                ctx.info();
                outcome.success = true;
            }
            Command::Ssh => {
                outcome.success = self.ssh(&run_set, ctx.reporter()).await?;
            }
            Command::Reset => {
                outcome.success = ctx.reset().await?;
            }
        }

        Ok(outcome)
    }

    fn context(&self, invocation: &Invocation, reporter: Reporter, run_set: Vec<Arc<Machine>>) -> RunContext {
        let options = RunOptions {
            mode: if invocation.command == Command::Debug {
                BuildMode::Debug
            } else {
                BuildMode::Release
            },
            keyboard_layout: invocation.keyboard_layout.clone(),
            detach: invocation.command == Command::Start,
        };
        let lifecycle = LifecycleController::new(
            self.engine.clone(),
            self.connector.clone(),
            self.settings.timing.clone(),
        );
        RunContext::new(self.settings.clone(), options, lifecycle, reporter, run_set)
    }

    async fn ssh(&self, run_set: &[Arc<Machine>], reporter: &Reporter) -> Result<bool> {
        let [machine] = run_set else {
            return Err(FleetError::SingleMachineRequired(Command::Ssh.as_str().to_string()));
        };

        let Some(endpoint) = machine.endpoint() else {
            reporter.line("Connection failed");
            return Ok(false);
        };
        match open_interactive(&endpoint).await {
            Ok(Some(0)) => Ok(true),
            Ok(code) => {
                log::warn!("[SSH] Interactive session on {} exited with {:?}", machine.name, code);
                reporter.line("Connection failed");
                Ok(false)
            }
            Err(e) => {
                log::error!("[SSH] {}", e);
                reporter.line("Connection failed");
                Ok(false)
            }
        }
    }
}
