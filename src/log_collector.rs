//! Decoupled logging pipeline for batch runs.
//!
//! ```text
//! log::info!() ...
//!     |
//! [LogCollector] (implements log::Log, never blocks the caller)
//!     | (crossbeam unbounded channel)
//! [persister thread]
//!     |            |
//! logs/<ts>.log  stderr
//! ```
//!
//! Every record is appended to a per-run file named after the start time and
//! echoed to stderr. `wait_for_empty` drains the channel before exit so the
//! final batch summary is on disk.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

enum LogMessage {
    Line(LogLine),
    /// Reply once every earlier line is written.
    Flush(std::sync::mpsc::Sender<()>),
}

/// A formatted log record.
#[derive(Clone, Debug)]
pub struct LogLine {
    pub message: String,
    pub timestamp: String,
}

impl LogLine {
    pub fn new(message: String) -> Self {
        LogLine {
            message,
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        }
    }

    fn render(&self) -> String {
        format!("[{}] {}\n", self.timestamp, self.message)
    }
}

/// Logger that persists every record from a background thread.
#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    log_path: PathBuf,
}

impl LogCollector {
    /// Create `log_dir` and a fresh `<timestamp>.log` inside it, then start
    /// the persister thread.
    ///
    /// # Arguments
    /// * `log_dir` - Directory for the run log
    /// * `echo` - Also write each line to stderr
    pub fn new(log_dir: &Path, echo: bool) -> Result<Self, String> {
        std::fs::create_dir_all(log_dir)
            .map_err(|e| format!("Failed to create log directory: {}", e))?;

        let log_path = session_log_path(log_dir);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| format!("Failed to open log file {}: {}", log_path.display(), e))?;

        let (tx, rx) = unbounded::<LogMessage>();

        // OS thread, not a tokio task: records must land even while the
        // runtime is shutting down.
        std::thread::spawn(move || {
            let mut file: File = file;
            while let Ok(msg) = rx.recv() {
                match msg {
                    LogMessage::Line(line) => {
                        let rendered = line.render();
                        let _ = file.write_all(rendered.as_bytes());
                        if echo {
                            eprint!("{}", rendered);
                        }
                    }
                    LogMessage::Flush(done) => {
                        let _ = file.flush();
                        let _ = file.sync_data();
                        let _ = done.send(());
                    }
                }
            }
        });

        Ok(LogCollector { tx, log_path })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Queue a line. Never blocks.
    pub fn log_str(&self, message: impl Into<String>) {
        let _ = self.tx.send(LogMessage::Line(LogLine::new(message.into())));
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

    /// Register a clone of this collector as the global `log` logger.
    pub fn install(&self, level: LevelFilter) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self.clone()))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for LogCollector {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.log_str(format!("[{}] {}", record.level(), record.args()));
        }
    }

    fn flush(&self) {}
}

/// `logs/<YYYYmmdd_HHMMSS>.log`, suffixed when a run in the same second exists.
fn session_log_path(log_dir: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let mut path = log_dir.join(format!("{}.log", stamp));
    let mut n = 1;
    while path.exists() {
        path = log_dir.join(format!("{}_{}.log", stamp, n));
        n += 1;
    }
    path
}
