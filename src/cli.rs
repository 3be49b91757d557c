//! Command-line surface.

use crate::commands::{Command, Invocation};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vmfleet", version, about = "Build and test a project on a fleet of virtual machines")]
pub struct Cli {
    /// Settings file (default: ./fleet.toml, then the user settings)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Options of the commands that boot machines.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct BootArgs {
    /// Keyboard layout passed to the VM display
    #[arg(short = 'k', long = "keyboard", value_name = "LAYOUT")]
    pub keyboard: Option<String>,

    /// Disable hardware acceleration
    #[arg(long = "no-accel", alias = "no_accel")]
    pub no_accel: bool,

    /// Machine key or name glob patterns (default: every machine)
    #[arg(value_name = "PATTERN")]
    pub patterns: Vec<String>,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectArgs {
    /// Machine key or name glob patterns (default: every machine)
    #[arg(value_name = "PATTERN")]
    pub patterns: Vec<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Build and run the tests on every machine (release flags)
    Test(BootArgs),
    /// Build and run the tests on every machine (debug flags)
    Debug(BootArgs),
    /// Build the missing prebuilt binaries and assemble the package
    #[command(alias = "build")]
    Dist(BootArgs),
    /// Boot the machines and leave them running
    Start(BootArgs),
    /// Shut the machines down
    Stop(SelectArgs),
    /// Print connection details
    Info(SelectArgs),
    /// Open an interactive shell on one machine
    Ssh(SelectArgs),
    /// Restore the base disk snapshot
    Reset(SelectArgs),
}

impl Cli {
    /// Parse `args`, program name first.
    pub fn parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Cli::try_parse_from(args)
    }
}

impl CliCommand {
    pub fn into_invocation(self) -> Invocation {
        let (command, boot, patterns) = match self {
            CliCommand::Test(args) => (Command::Test, Some((args.keyboard, args.no_accel)), args.patterns),
            CliCommand::Debug(args) => (Command::Debug, Some((args.keyboard, args.no_accel)), args.patterns),
            CliCommand::Dist(args) => (Command::Dist, Some((args.keyboard, args.no_accel)), args.patterns),
            CliCommand::Start(args) => (Command::Start, Some((args.keyboard, args.no_accel)), args.patterns),
            CliCommand::Stop(args) => (Command::Stop, None, args.patterns),
            CliCommand::Info(args) => (Command::Info, None, args.patterns),
            CliCommand::Ssh(args) => (Command::Ssh, None, args.patterns),
            CliCommand::Reset(args) => (Command::Reset, None, args.patterns),
        };
        let (keyboard_layout, no_accel) = boot.unwrap_or((None, false));

        Invocation {
            command,
            patterns,
            keyboard_layout,
            accelerate: !no_accel,
        }
    }
}

/// Exit code for a clap error: 0 for help and version, 1 otherwise.
pub fn parse_error_code(error: &clap::Error) -> i32 {
    use clap::error::ErrorKind;
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}
