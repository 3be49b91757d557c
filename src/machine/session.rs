//! Remote session seam: command execution and file transfer.

use crate::error::MachineError;
use crate::models::{Endpoint, ExecOutput};
use futures::future::BoxFuture;
use regex::Regex;
use std::path::PathBuf;

/// Options for [`RemoteSession::push_tree`] and [`RemoteSession::pull_tree`].
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub recursive: bool,
    pub concurrency: usize,
    /// File names matching this are not transferred
    pub exclude: Option<Regex>,
}

impl TransferOptions {
    pub fn recursive(concurrency: usize) -> Self {
        TransferOptions {
            recursive: true,
            concurrency: concurrency.max(1),
            exclude: None,
        }
    }

    pub fn flat(concurrency: usize) -> Self {
        TransferOptions {
            recursive: false,
            concurrency: concurrency.max(1),
            exclude: None,
        }
    }

    pub fn excluding(mut self, pattern: Regex) -> Self {
        self.exclude = Some(pattern);
        self
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.exclude.as_ref().map_or(true, |re| !re.is_match(name))
    }
}

/// An open command/file-transfer session to one machine.
pub trait RemoteSession: Send + Sync {
    /// Run a command. A non-zero exit is a normal `Ok` outcome; `Err` means
    /// the command could not be run at all.
    fn exec(&self, command: String, cwd: Option<String>) -> BoxFuture<'_, Result<ExecOutput, MachineError>>;

    /// Copy a local directory into `remote`, creating it.
    fn push_tree(
        &self,
        local: PathBuf,
        remote: String,
        options: TransferOptions,
    ) -> BoxFuture<'_, Result<(), MachineError>>;

    /// Copy the files of a remote directory into `local`, creating it.
    fn pull_tree(
        &self,
        remote: String,
        local: PathBuf,
        options: TransferOptions,
    ) -> BoxFuture<'_, Result<(), MachineError>>;

    /// Resolves once the remote end has gone away.
    fn wait_closed(&self) -> BoxFuture<'_, ()>;
}

/// Opens sessions.
pub trait SessionConnector: Send + Sync {
    /// Make sure the transport tools are installed.
    fn preflight(&self) -> BoxFuture<'static, Result<(), String>>;

    /// Open one session. `windows` selects the remote shell dialect.
    fn connect(
        &self,
        endpoint: Endpoint,
        windows: bool,
    ) -> BoxFuture<'static, Result<Box<dyn RemoteSession>, MachineError>>;
}
