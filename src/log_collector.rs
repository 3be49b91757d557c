//! Decoupled run log for fleet invocations.
//!
//! The console belongs to the [`Reporter`](crate::console::Reporter): status
//! lines only. Everything emitted through the `log` facade goes to a per-run
//! file instead, written by a dedicated thread so machine futures never block
//! on disk I/O.
//!
//! ```text
//! log::info!() ... (any task, any thread)
//!     |
//! [LogCollector] (crossbeam unbounded channel)
//!     |
//! [writer thread] -> <logs>/<YYYYmmdd_HHMMSS>_run.log
//! ```

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable selecting the file log verbosity.
pub const LOG_ENV: &str = "VMFLEET_LOG";

enum LogMessage {
    Line(String),
    /// Flush marker with channel sender to signal completion
    Flush(std::sync::mpsc::Sender<()>),
}

/// Verbosity requested through [`LOG_ENV`], `info` when unset or invalid.
pub fn level_from_env() -> LevelFilter {
    std::env::var(LOG_ENV)
        .ok()
        .and_then(|value| LevelFilter::from_str(value.trim()).ok())
        .unwrap_or(LevelFilter::Info)
}

/// Format one record line: `[HH:MM:SS.mmm] [LEVEL] message`.
pub fn format_line(level: log::Level, message: &str) -> String {
    format!("[{}] [{}] {}\n", Local::now().format("%H:%M:%S%.3f"), level, message)
}

#[derive(Clone)]
pub struct LogCollector {
    /// crossbeam unbounded: sending never blocks, from any runtime
    tx: Sender<LogMessage>,
    path: PathBuf,
    level: LevelFilter,
}

impl LogCollector {
    /// Create the run log file in `log_dir` and spawn its writer thread.
    pub fn new(log_dir: &Path, level: LevelFilter) -> Result<Self, String> {
        std::fs::create_dir_all(log_dir)
            .map_err(|e| format!("Failed to create logs directory: {}", e))?;

        let path = log_dir.join(format!("{}_run.log", Local::now().format("%Y%m%d_%H%M%S")));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))?;

        let (tx, rx) = unbounded::<LogMessage>();
        std::thread::spawn(move || write_loop(file, rx));

        Ok(LogCollector { tx, path, level })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a raw line.
    pub fn log_str(&self, level: log::Level, message: impl AsRef<str>) {
        let _ = self
            .tx
            .send(LogMessage::Line(format_line(level, message.as_ref())));
    }

    /// Wait until every line queued before this call is on disk.
    pub async fn wait_for_empty(&self) -> Result<(), String> {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        self.tx
            .send(LogMessage::Flush(tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;

        tokio::task::spawn_blocking(move || rx.recv())
            .await
            .map_err(|e| format!("Flush task failed: {}", e))?
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

fn write_loop(mut file: File, rx: crossbeam_channel::Receiver<LogMessage>) {
    while let Ok(msg) = rx.recv() {
        match msg {
            LogMessage::Line(line) => {
                let _ = file.write_all(line.as_bytes());
            }
            LogMessage::Flush(done) => {
                let _ = file.flush();
                let _ = file.sync_data();
                let _ = done.send(());
            }
        }
    }
}

/// Wires log::info!(), log::warn!() and friends into the run log.
impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.log_str(record.level(), record.args().to_string());
        }
    }

    fn flush(&self) {}
}

/// Install a [`LogCollector`] writing to `log_dir` as the global logger.
///
/// Returns a handle so the caller can flush before exiting.
pub fn init(log_dir: &Path) -> Result<LogCollector, String> {
    let level = level_from_env();
    let collector = LogCollector::new(log_dir, level)?;

    log::set_boxed_logger(Box::new(collector.clone()))
        .map_err(|e| format!("Logger already installed: {}", e))?;
    log::set_max_level(level);

    log::info!("[Log] Run log: {}", collector.path().display());
    Ok(collector)
}
