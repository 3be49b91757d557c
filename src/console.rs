//! Operator-facing status lines.
//!
//! One aligned line per (machine, action) with a bracketed marker, plus the
//! captured output of failed remote commands. Every line is mirrored into
//! the run log.

use crate::models::ExecOutput;
use std::io::IsTerminal;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Width of the action column.
const ACTION_WIDTH: usize = 34;

pub mod codes {
    pub const GREEN: u8 = 71;
    pub const RED: u8 = 167;
    pub const GRAY: u8 = 245;
    pub const YELLOW: u8 = 179;
}

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Determine if color output should be enabled.
///
/// Priority: `NO_COLOR=1` disables, then `COLOR=1` forces, then TTY check.
pub fn should_colorize() -> bool {
    if std::env::var("NO_COLOR").is_ok_and(|v| v == "1") {
        return false;
    }
    if std::env::var("COLOR").is_ok_and(|v| v == "1") {
        return true;
    }
    std::io::stdout().is_terminal()
}

fn fg256(code: u8) -> String {
    format!("\x1b[38;5;{code}m")
}

/// Terminal marker of a status line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Status {
    Ok,
    Error,
    Ignore,
    Manual,
    Missing,
    /// Successful command with its duration
    Time(Duration),
}

impl Status {
    pub fn label(&self) -> String {
        match self {
            Status::Ok => "[ok]".to_string(),
            Status::Error => "[error]".to_string(),
            Status::Ignore => "[ignore]".to_string(),
            Status::Manual => "[manual]".to_string(),
            Status::Missing => "[missing]".to_string(),
            Status::Time(elapsed) => format!("[{:.2}s]", elapsed.as_secs_f64()),
        }
    }

    fn color(&self) -> u8 {
        match self {
            Status::Ok | Status::Time(_) => codes::GREEN,
            Status::Error | Status::Manual | Status::Missing => codes::RED,
            Status::Ignore => codes::GRAY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reporter {
    align: usize,
    colorize: bool,
    /// Test sink: lines are recorded uncolored instead of printed
    captured: Option<Arc<Mutex<Vec<String>>>>,
}

impl Reporter {
    /// Reporter aligned on the longest machine name.
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Reporter {
            align: names.into_iter().map(str::len).max().unwrap_or(0),
            colorize: should_colorize(),
            captured: None,
        }
    }

    /// Reporter that records lines instead of printing them.
    pub fn capturing<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Reporter {
            colorize: false,
            captured: Some(Arc::new(Mutex::new(Vec::new()))),
            ..Reporter::new(names)
        }
    }

    /// Lines recorded by a capturing reporter.
    pub fn lines(&self) -> Vec<String> {
        match &self.captured {
            Some(lines) => lines.lock().map(|l| l.clone()).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    fn paint(&self, text: &str, code: u8, bold: bool) -> String {
        if !self.colorize {
            return text.to_string();
        }
        let weight = if bold { BOLD } else { "" };
        format!("{}{}{}{}", weight, fg256(code), text, RESET)
    }

    fn emit(&self, line: String, to_stderr: bool) {
        match &self.captured {
            Some(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(line);
                }
            }
            None if to_stderr => eprintln!("{}", line),
            None => println!("{}", line),
        }
    }

    /// Uncolored status line.
    pub fn format_status(&self, machine: &str, action: &str, status: Status) -> String {
        self.format_line(machine, action, &status.label())
    }

    fn format_line(&self, machine: &str, action: &str, marker: &str) -> String {
        let pad_name = self.align.saturating_sub(machine.len());
        let pad_action = ACTION_WIDTH.saturating_sub(action.len());
        format!(
            "     [{}]{}  {}{}  {}",
            machine,
            " ".repeat(pad_name),
            action,
            " ".repeat(pad_action),
            marker
        )
    }

    pub fn section(&self, title: &str) {
        log::info!(">> {}", title);
        self.emit(format!(">> {}", title), false);
    }

    /// Plain line, for listings.
    pub fn line(&self, text: &str) {
        log::info!("{}", text);
        self.emit(text.to_string(), false);
    }

    pub fn status(&self, machine: &str, action: &str, status: Status) {
        let plain = self.format_status(machine, action, status);
        match status {
            Status::Error | Status::Missing | Status::Manual => log::warn!("{}", plain.trim_start()),
            _ => log::info!("{}", plain.trim_start()),
        }

        let marker = self.paint(&status.label(), status.color(), true);
        self.emit(self.format_line(machine, action, &marker), false);
    }

    fn block(&self, heading: &str, content: &str) {
        let indent = " ".repeat(self.align + 9);
        let body_indent = " ".repeat(self.align + 13);
        let body: Vec<String> = content
            .trim_end_matches('\n')
            .lines()
            .map(|line| format!("{}{}", body_indent, line))
            .collect();

        log::info!("{}:\n{}", heading, content.trim_end());
        self.emit(format!("{}{}:", indent, heading), true);
        self.emit(self.paint(&body.join("\n"), codes::YELLOW, false), true);
        self.emit(String::new(), true);
    }

    /// Captured output of a failed command, indented under its status line.
    pub fn output(&self, output: &ExecOutput) {
        if output.stdout.is_empty() && output.stderr.is_empty() {
            return;
        }
        self.emit(String::new(), true);
        if !output.stdout.is_empty() {
            self.block("Standard output", &output.stdout);
        }
        if !output.stderr.is_empty() {
            self.block("Standard error", &output.stderr);
        }
    }

    /// Final verdict of a pipeline run.
    pub fn final_status(&self, success: bool, some_ignored: bool) {
        self.emit(String::new(), false);
        if success {
            log::info!(">> Status: SUCCESS");
            self.emit(format!(">> Status: {}", self.paint("SUCCESS", codes::GREEN, true)), false);
            if some_ignored {
                self.emit("   (but some machines could not be tested)".to_string(), false);
            }
        } else {
            log::warn!(">> Status: FAILED");
            self.emit(format!(">> Status: {}", self.paint("FAILED", codes::RED, true)), false);
        }
    }
}
