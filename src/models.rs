//! Core data types for vmfleet.
//!
//! A [`Machine`] is the immutable descriptor loaded from the registry. Run-time
//! state (session, started flag, ignore membership) lives in
//! [`crate::machine::MachineRuntime`] and never in these types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hardware acceleration mode passed to QEMU with `-accel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    Kvm,
    Whpx,
}

impl Accelerator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Accelerator::Kvm => "kvm",
            Accelerator::Whpx => "whpx",
        }
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boot descriptor of a virtual machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QemuSpec {
    /// QEMU system binary, without prefix or `.exe` suffix
    pub binary: String,

    #[serde(default)]
    pub arguments: Vec<String>,

    /// Disk image, relative to the machine directory
    pub disk: String,

    pub ssh_port: u16,

    #[serde(default)]
    pub vnc_port: Option<u16>,

    pub username: String,
    pub password: String,

    /// Remote command that powers the machine off
    pub shutdown: String,

    /// Minimum version of the local machine files
    #[serde(default)]
    pub version: u32,

    /// Computed at load time, never read from the registry
    #[serde(skip)]
    pub accelerate: Option<Accelerator>,
}

/// Remote shell endpoint of a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// One build suite: where and how to compile for one architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub arch: String,
    pub directory: String,
    pub build: String,
}

/// A test command, either a plain command line or a repeated one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestCommand {
    Line(String),
    Repeated {
        command: String,
        #[serde(default = "default_repeat")]
        repeat: u32,
    },
}

fn default_repeat() -> u32 {
    1
}

impl TestCommand {
    pub fn command(&self) -> &str {
        match self {
            TestCommand::Line(line) => line,
            TestCommand::Repeated { command, .. } => command,
        }
    }

    pub fn repeat(&self) -> u32 {
        match self {
            TestCommand::Line(_) => 1,
            TestCommand::Repeated { repeat, .. } => (*repeat).max(1),
        }
    }
}

/// One test suite: build step plus ordered named test commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    pub directory: String,
    pub build: String,
    #[serde(default)]
    pub commands: IndexMap<String, TestCommand>,
}

/// A fleet member as declared in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Registry key, filled in at load time
    #[serde(skip)]
    pub key: String,

    #[serde(default)]
    pub name: String,

    pub platform: String,

    #[serde(default)]
    pub qemu: Option<QemuSpec>,

    /// Endpoint of a manual machine (no `qemu` section)
    #[serde(default)]
    pub ssh: Option<Endpoint>,

    #[serde(default)]
    pub builds: IndexMap<String, BuildSpec>,

    #[serde(default)]
    pub tests: IndexMap<String, TestSpec>,
}

impl Machine {
    /// A machine without boot descriptor is never booted nor stopped.
    pub fn is_manual(&self) -> bool {
        self.qemu.is_none()
    }

    pub fn is_windows(&self) -> bool {
        self.platform == "win32"
    }

    /// Remote shell endpoint: forwarded localhost port for QEMU machines,
    /// declared `ssh` section for manual ones.
    pub fn endpoint(&self) -> Option<Endpoint> {
        match &self.qemu {
            Some(qemu) => Some(Endpoint {
                host: default_host(),
                port: qemu.ssh_port,
                username: qemu.username.clone(),
                password: qemu.password.clone(),
            }),
            None => self.ssh.clone(),
        }
    }

    /// Remote directories that receive the source snapshot, in declaration order.
    pub fn upload_directories(&self) -> Vec<String> {
        let mut dirs: Vec<String> = Vec::new();
        let declared = self
            .builds
            .values()
            .map(|b| &b.directory)
            .chain(self.tests.values().map(|t| &t.directory));
        for dir in declared {
            if !dirs.contains(dir) {
                dirs.push(dir.clone());
            }
        }
        dirs
    }
}

/// Which build command variant a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    #[default]
    Release,
    Debug,
}

/// Captured result of one remote command.
///
/// `code` is `None` when the command never completed (transport failure).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn transport_failure(message: impl Into<String>) -> Self {
        ExecOutput {
            code: None,
            stdout: String::new(),
            stderr: message.into(),
        }
    }
}
