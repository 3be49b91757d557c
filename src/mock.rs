//! Scripted engine and transport for driving the orchestrator in tests.
//!
//! Hosts are keyed by their SSH port, VM launches by machine directory name
//! (the registry key).

use crate::error::MachineError;
use crate::machine::engine::{LaunchOutcome, LaunchRequest, VmEngine};
use crate::machine::session::{RemoteSession, SessionConnector, TransferOptions};
use crate::models::{Endpoint, ExecOutput};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// What a scripted VM launch does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchScript {
    #[default]
    Running,
    Exit(Option<i32>),
    SpawnError,
}

/// VM engine that records launches and answers from a script.
#[derive(Default)]
pub struct MockEngine {
    scripts: Mutex<HashMap<String, LaunchScript>>,
    launches: Mutex<Vec<LaunchRequest>>,
    restores: Mutex<Vec<(PathBuf, String, String)>>,
    restore_output: Mutex<Option<ExecOutput>>,
    missing: bool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine whose preflight fails.
    pub fn missing() -> Self {
        MockEngine {
            missing: true,
            ..Self::default()
        }
    }

    pub fn script(&self, key: &str, script: LaunchScript) {
        lock(&self.scripts).insert(key.to_string(), script);
    }

    pub fn set_restore_output(&self, output: ExecOutput) {
        *lock(&self.restore_output) = Some(output);
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        lock(&self.launches).clone()
    }

    pub fn restores(&self) -> Vec<(PathBuf, String, String)> {
        lock(&self.restores).clone()
    }
}

impl VmEngine for MockEngine {
    fn preflight(&self) -> BoxFuture<'static, Result<(), String>> {
        let missing = self.missing;
        Box::pin(async move {
            if missing {
                Err("QEMU does not seem to be installed".to_string())
            } else {
                Ok(())
            }
        })
    }

    fn launch(&self, request: LaunchRequest) -> BoxFuture<'static, Result<LaunchOutcome, MachineError>> {
        let key = request
            .cwd
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let script = lock(&self.scripts).get(&key).copied().unwrap_or_default();
        let binary = request.binary.clone();
        lock(&self.launches).push(request);

        Box::pin(async move {
            match script {
                LaunchScript::Running => Ok(LaunchOutcome::Running),
                LaunchScript::Exit(code) => Ok(LaunchOutcome::Exited(code)),
                LaunchScript::SpawnError => Err(MachineError::BootFailed {
                    machine: binary,
                    reason: "scripted spawn failure".to_string(),
                }),
            }
        })
    }

    fn restore_snapshot(
        &self,
        machine_dir: PathBuf,
        disk: String,
        snapshot: String,
    ) -> BoxFuture<'static, Result<ExecOutput, MachineError>> {
        lock(&self.restores).push((machine_dir, disk, snapshot));
        let output = lock(&self.restore_output).clone().unwrap_or(ExecOutput {
            code: Some(0),
            ..Default::default()
        });
        Box::pin(async move { Ok(output) })
    }
}

/// Scripted behavior of one remote host.
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    pub reachable: bool,
    /// Connection attempts refused before the host answers
    pub refuse_connects: u32,
    /// First rule whose needle appears in the command decides its output
    pub rules: Vec<(String, ExecOutput)>,
    /// Command that closes the session
    pub shutdown_command: Option<String>,
    pub hang_on_shutdown: bool,
    pub fail_push: bool,
    pub fail_pull: bool,
    /// Files served by every pull: (name, content)
    pub files: Vec<(String, String)>,
    /// Time every connection and remote operation takes to settle
    pub latency: Duration,
}

impl MockHost {
    pub fn up() -> Self {
        MockHost {
            reachable: true,
            ..Self::default()
        }
    }

    pub fn down() -> Self {
        MockHost::default()
    }

    pub fn refusing(mut self, attempts: u32) -> Self {
        self.refuse_connects = attempts;
        self
    }

    pub fn respond(mut self, needle: &str, code: i32, stdout: &str, stderr: &str) -> Self {
        self.rules.push((
            needle.to_string(),
            ExecOutput {
                code: Some(code),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
        ));
        self
    }

    pub fn shutdown_with(mut self, command: &str) -> Self {
        self.shutdown_command = Some(command.to_string());
        self
    }

    pub fn hanging_on_shutdown(mut self) -> Self {
        self.hang_on_shutdown = true;
        self
    }

    pub fn failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    pub fn failing_pull(mut self) -> Self {
        self.fail_pull = true;
        self
    }

    pub fn serving(mut self, name: &str, content: &str) -> Self {
        self.files.push((name.to_string(), content.to_string()));
        self
    }

    pub fn slow(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// Remote operation as it settled, in fleet-wide order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Connected(u16),
    Exec(u16, String),
    Push(u16, String),
    Pull(u16, String),
}

impl MockEvent {
    pub fn port(&self) -> u16 {
        match self {
            MockEvent::Connected(port)
            | MockEvent::Exec(port, _)
            | MockEvent::Push(port, _)
            | MockEvent::Pull(port, _) => *port,
        }
    }
}

type Events = Arc<Mutex<Vec<MockEvent>>>;

async fn settle(latency: Duration, events: &Events, event: MockEvent) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
    lock(events).push(event);
}

/// One recorded remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRecord {
    pub command: String,
    pub cwd: Option<String>,
}

struct HostState {
    script: MockHost,
    connects: u32,
    execs: Vec<ExecRecord>,
    pushes: Vec<(PathBuf, String)>,
    pulls: Vec<(String, PathBuf)>,
    closed: watch::Sender<bool>,
}

type Hosts = Arc<Mutex<BTreeMap<u16, HostState>>>;

/// Session connector serving scripted hosts.
#[derive(Clone, Default)]
pub struct MockConnector {
    hosts: Hosts,
    events: Events,
    missing: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector whose preflight fails.
    pub fn missing() -> Self {
        MockConnector {
            missing: true,
            ..Self::default()
        }
    }

    pub fn add_host(&self, port: u16, script: MockHost) {
        let (closed, _) = watch::channel(false);
        lock(&self.hosts).insert(
            port,
            HostState {
                script,
                connects: 0,
                execs: Vec::new(),
                pushes: Vec::new(),
                pulls: Vec::new(),
                closed,
            },
        );
    }

    pub fn connect_attempts(&self, port: u16) -> u32 {
        lock(&self.hosts).get(&port).map_or(0, |h| h.connects)
    }

    pub fn execs(&self, port: u16) -> Vec<ExecRecord> {
        lock(&self.hosts)
            .get(&port)
            .map(|h| h.execs.clone())
            .unwrap_or_default()
    }

    pub fn commands(&self, port: u16) -> Vec<String> {
        self.execs(port).into_iter().map(|e| e.command).collect()
    }

    pub fn pushes(&self, port: u16) -> Vec<(PathBuf, String)> {
        lock(&self.hosts)
            .get(&port)
            .map(|h| h.pushes.clone())
            .unwrap_or_default()
    }

    pub fn pulls(&self, port: u16) -> Vec<(String, PathBuf)> {
        lock(&self.hosts)
            .get(&port)
            .map(|h| h.pulls.clone())
            .unwrap_or_default()
    }

    /// Every remote operation (connect aside) issued to the host.
    pub fn operation_count(&self, port: u16) -> usize {
        lock(&self.hosts)
            .get(&port)
            .map_or(0, |h| h.execs.len() + h.pushes.len() + h.pulls.len())
    }

    /// Settled operations of every host, oldest first.
    pub fn events(&self) -> Vec<MockEvent> {
        lock(&self.events).clone()
    }

    pub fn is_closed(&self, port: u16) -> bool {
        lock(&self.hosts)
            .get(&port)
            .map_or(false, |h| *h.closed.borrow())
    }
}

impl SessionConnector for MockConnector {
    fn preflight(&self) -> BoxFuture<'static, Result<(), String>> {
        let missing = self.missing;
        Box::pin(async move {
            if missing {
                Err("SSH client does not seem to be installed".to_string())
            } else {
                Ok(())
            }
        })
    }

    fn connect(
        &self,
        endpoint: Endpoint,
        _windows: bool,
    ) -> BoxFuture<'static, Result<Box<dyn RemoteSession>, MachineError>> {
        let port = endpoint.port;
        let (accepted, latency) = {
            let mut hosts = lock(&self.hosts);
            match hosts.get_mut(&port) {
                Some(host) => {
                    host.connects += 1;
                    let accepted = host.script.reachable && host.connects > host.script.refuse_connects;
                    (accepted, host.script.latency)
                }
                None => (false, Duration::ZERO),
            }
        };
        let hosts = self.hosts.clone();
        let events = self.events.clone();

        Box::pin(async move {
            if accepted {
                settle(latency, &events, MockEvent::Connected(port)).await;
                Ok(Box::new(MockSession {
                    hosts,
                    events,
                    port,
                    latency,
                }) as Box<dyn RemoteSession>)
            } else {
                Err(MachineError::Unreachable(format!("{}:{}", endpoint.host, port)))
            }
        })
    }
}

struct MockSession {
    hosts: Hosts,
    events: Events,
    port: u16,
    latency: Duration,
}

impl RemoteSession for MockSession {
    fn exec(&self, command: String, cwd: Option<String>) -> BoxFuture<'_, Result<ExecOutput, MachineError>> {
        let result = {
            let mut hosts = lock(&self.hosts);
            match hosts.get_mut(&self.port) {
                Some(host) => {
                    host.execs.push(ExecRecord {
                        command: command.clone(),
                        cwd,
                    });
                    if host.script.shutdown_command.as_deref() == Some(command.as_str())
                        && !host.script.hang_on_shutdown
                    {
                        host.closed.send_replace(true);
                    }
                    let output = host
                        .script
                        .rules
                        .iter()
                        .find(|(needle, _)| command.contains(needle.as_str()))
                        .map(|(_, output)| output.clone())
                        .unwrap_or(ExecOutput {
                            code: Some(0),
                            ..Default::default()
                        });
                    Ok(output)
                }
                None => Err(MachineError::Session("host vanished".to_string())),
            }
        };
        Box::pin(async move {
            settle(self.latency, &self.events, MockEvent::Exec(self.port, command)).await;
            result
        })
    }

    fn push_tree(
        &self,
        local: PathBuf,
        remote: String,
        _options: TransferOptions,
    ) -> BoxFuture<'_, Result<(), MachineError>> {
        let result = {
            let mut hosts = lock(&self.hosts);
            match hosts.get_mut(&self.port) {
                Some(host) => {
                    host.pushes.push((local.clone(), remote.clone()));
                    if host.script.fail_push {
                        Err(MachineError::Transfer(format!("scripted push failure to {}", remote)))
                    } else if !local.is_dir() {
                        Err(MachineError::Transfer(format!("{} is not a directory", local.display())))
                    } else {
                        Ok(())
                    }
                }
                None => Err(MachineError::Session("host vanished".to_string())),
            }
        };
        Box::pin(async move {
            settle(self.latency, &self.events, MockEvent::Push(self.port, remote)).await;
            result
        })
    }

    fn pull_tree(
        &self,
        remote: String,
        local: PathBuf,
        options: TransferOptions,
    ) -> BoxFuture<'_, Result<(), MachineError>> {
        let files = {
            let mut hosts = lock(&self.hosts);
            match hosts.get_mut(&self.port) {
                Some(host) => {
                    host.pulls.push((remote.clone(), local.clone()));
                    if host.script.fail_pull {
                        Err(MachineError::Transfer(format!("scripted pull failure from {}", remote)))
                    } else {
                        Ok(host.script.files.clone())
                    }
                }
                None => Err(MachineError::Session("host vanished".to_string())),
            }
        };

        Box::pin(async move {
            settle(self.latency, &self.events, MockEvent::Pull(self.port, remote)).await;
            let files = files?;
            std::fs::create_dir_all(&local).map_err(|e| MachineError::Transfer(e.to_string()))?;
            for (name, content) in files.iter().filter(|(name, _)| options.accepts(name)) {
                std::fs::write(local.join(name), content)
                    .map_err(|e| MachineError::Transfer(e.to_string()))?;
            }
            Ok(())
        })
    }

    fn wait_closed(&self) -> BoxFuture<'_, ()> {
        let receiver = lock(&self.hosts).get(&self.port).map(|h| h.closed.subscribe());
        Box::pin(async move {
            match receiver {
                Some(mut receiver) => {
                    let _ = receiver.wait_for(|closed| *closed).await;
                }
                None => futures::future::pending::<()>().await,
            }
        })
    }
}
