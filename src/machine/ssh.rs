//! SSH transport through the system `ssh`, `scp` and `sshpass` tools.
//!
//! Passwords travel in the `SSHPASS` environment variable, never in argv.
//! Host keys are not checked: fleet machines are disposable and get reset
//! from a disk snapshot.

use crate::error::MachineError;
use crate::machine::session::{RemoteSession, SessionConnector, TransferOptions};
use crate::models::{Endpoint, ExecOutput};
use futures::future::BoxFuture;
use futures::stream::{self, TryStreamExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const CLOSE_POLL_INTERVAL: Duration = Duration::from_secs(1);

fn known_hosts_sink() -> &'static str {
    if cfg!(windows) {
        "NUL"
    } else {
        "/dev/null"
    }
}

fn common_options() -> Vec<String> {
    vec![
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        format!("UserKnownHostsFile={}", known_hosts_sink()),
        "-o".to_string(),
        "LogLevel=ERROR".to_string(),
    ]
}

/// Quote for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Backslash path for a Windows shell.
pub fn windows_path(value: &str) -> String {
    value.replace('/', "\\")
}

async fn run(mut command: Command) -> Result<ExecOutput, MachineError> {
    let output = command
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| MachineError::Session(format!("cannot run ssh tools: {}", e)))?;
    Ok(ExecOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Connector using the system OpenSSH client.
#[derive(Debug, Clone, Default)]
pub struct SshConnector;

impl SessionConnector for SshConnector {
    fn preflight(&self) -> BoxFuture<'static, Result<(), String>> {
        Box::pin(async {
            let mut command = Command::new("ssh");
            command.arg("-V");
            match run(command).await {
                Ok(output) if output.success() => Ok(()),
                _ => Err("SSH client does not seem to be installed".to_string()),
            }
        })
    }

    fn connect(
        &self,
        endpoint: Endpoint,
        windows: bool,
    ) -> BoxFuture<'static, Result<Box<dyn RemoteSession>, MachineError>> {
        Box::pin(async move {
            let session = SshSession { endpoint, windows };
            let probe = session.exec("exit 0".to_string(), None).await?;
            if !probe.success() {
                log::debug!(
                    "[SSH] {}:{} refused: {}",
                    session.endpoint.host,
                    session.endpoint.port,
                    probe.stderr.trim()
                );
                return Err(MachineError::Unreachable(format!(
                    "{}:{}",
                    session.endpoint.host, session.endpoint.port
                )));
            }
            Ok(Box::new(session) as Box<dyn RemoteSession>)
        })
    }
}

/// One logical session. Every operation opens its own `ssh`/`scp` process.
#[derive(Debug, Clone)]
pub struct SshSession {
    endpoint: Endpoint,
    windows: bool,
}

impl SshSession {
    fn destination(&self) -> String {
        format!("{}@{}", self.endpoint.username, self.endpoint.host)
    }

    fn ssh(&self) -> Command {
        let mut command = Command::new("sshpass");
        command
            .env("SSHPASS", &self.endpoint.password)
            .arg("-e")
            .arg("ssh")
            .args(common_options())
            .arg("-p")
            .arg(self.endpoint.port.to_string())
            .arg(self.destination());
        command
    }

    fn scp(&self) -> Command {
        let mut command = Command::new("sshpass");
        command
            .env("SSHPASS", &self.endpoint.password)
            .arg("-e")
            .arg("scp")
            .args(common_options())
            .arg("-P")
            .arg(self.endpoint.port.to_string())
            .arg("-r");
        command
    }

    fn remote_spec(&self, path: &str) -> String {
        format!("{}:{}", self.destination(), path)
    }

    fn wrap_cwd(&self, command: &str, cwd: Option<&str>) -> String {
        match cwd {
            Some(dir) if self.windows => format!("cd /d \"{}\" && {}", windows_path(dir), command),
            Some(dir) => format!("cd {} && {}", shell_quote(dir), command),
            None => command.to_string(),
        }
    }

    async fn check(&self, command: String) -> Result<(), MachineError> {
        let output = self.exec(command.clone(), None).await?;
        if output.success() {
            Ok(())
        } else {
            Err(MachineError::Transfer(format!(
                "'{}' failed: {}",
                command,
                output.stderr.trim()
            )))
        }
    }

    async fn copy(&self, from: String, to: String) -> Result<(), MachineError> {
        let mut command = self.scp();
        command.arg(&from).arg(&to);
        let output = run(command).await?;
        if output.success() {
            Ok(())
        } else {
            Err(MachineError::Transfer(format!(
                "{} -> {}: {}",
                from,
                to,
                output.stderr.trim()
            )))
        }
    }

    async fn list_remote(&self, remote: &str, recursive: bool) -> Result<Vec<String>, MachineError> {
        let command = if self.windows {
            let kind = if recursive { "" } else { " /a-d" };
            format!("dir /b{} \"{}\"", kind, windows_path(remote))
        } else {
            format!("ls -1p {}", shell_quote(remote))
        };
        let output = self.exec(command, None).await?;
        if !output.success() {
            return Err(MachineError::Transfer(format!(
                "cannot list {}: {}",
                remote,
                output.stderr.trim()
            )));
        }

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| recursive || !line.ends_with('/'))
            .map(|line| line.trim_end_matches('/').to_string())
            .collect())
    }
}

fn local_entries(local: &Path, options: &TransferOptions) -> Result<Vec<PathBuf>, MachineError> {
    let read = std::fs::read_dir(local)
        .map_err(|e| MachineError::Transfer(format!("{}: {}", local.display(), e)))?;
    let mut entries = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| MachineError::Transfer(e.to_string()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !options.accepts(&name) {
            continue;
        }
        if !options.recursive && entry.path().is_dir() {
            continue;
        }
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

impl RemoteSession for SshSession {
    fn exec(&self, command: String, cwd: Option<String>) -> BoxFuture<'_, Result<ExecOutput, MachineError>> {
        Box::pin(async move {
            let line = self.wrap_cwd(&command, cwd.as_deref());
            log::debug!("[SSH] {}:{} $ {}", self.endpoint.host, self.endpoint.port, line);
            let mut ssh = self.ssh();
            ssh.arg(line);
            run(ssh).await
        })
    }

    fn push_tree(
        &self,
        local: PathBuf,
        remote: String,
        options: TransferOptions,
    ) -> BoxFuture<'_, Result<(), MachineError>> {
        Box::pin(async move {
            let mkdir = if self.windows {
                let dir = windows_path(&remote);
                format!("if not exist \"{}\" mkdir \"{}\"", dir, dir)
            } else {
                format!("mkdir -p {}", shell_quote(&remote))
            };
            self.check(mkdir).await?;

            let entries = local_entries(&local, &options)?;
            let target = self.remote_spec(&format!("{}/", remote.trim_end_matches('/')));
            stream::iter(entries.into_iter().map(Ok))
                .try_for_each_concurrent(options.concurrency, |path| {
                    let target = target.clone();
                    async move { self.copy(path.display().to_string(), target).await }
                })
                .await
        })
    }

    fn pull_tree(
        &self,
        remote: String,
        local: PathBuf,
        options: TransferOptions,
    ) -> BoxFuture<'_, Result<(), MachineError>> {
        Box::pin(async move {
            let names: Vec<String> = self
                .list_remote(&remote, options.recursive)
                .await?
                .into_iter()
                .filter(|name| options.accepts(name))
                .collect();

            tokio::fs::create_dir_all(&local)
                .await
                .map_err(|e| MachineError::Transfer(format!("{}: {}", local.display(), e)))?;

            let base = remote.trim_end_matches('/').to_string();
            stream::iter(names.into_iter().map(Ok))
                .try_for_each_concurrent(options.concurrency, |name| {
                    let from = self.remote_spec(&format!("{}/{}", base, name));
                    let to = local.join(&name).display().to_string();
                    async move { self.copy(from, to).await }
                })
                .await
        })
    }

    fn wait_closed(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let address = format!("{}:{}", self.endpoint.host, self.endpoint.port);
            while tokio::net::TcpStream::connect(address.as_str()).await.is_ok() {
                tokio::time::sleep(CLOSE_POLL_INTERVAL).await;
            }
            log::debug!("[SSH] {}:{} closed", self.endpoint.host, self.endpoint.port);
        })
    }
}

/// Open an interactive shell on `endpoint`, inheriting the terminal.
pub async fn open_interactive(endpoint: &Endpoint) -> Result<Option<i32>, MachineError> {
    let status = Command::new("sshpass")
        .env("SSHPASS", &endpoint.password)
        .arg("-e")
        .arg("ssh")
        .args(common_options())
        .arg("-p")
        .arg(endpoint.port.to_string())
        .arg(format!("{}@{}", endpoint.username, endpoint.host))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| MachineError::Session(e.to_string()))?;
    Ok(status.code())
}
