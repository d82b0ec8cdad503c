//! Persisted run state
//!
//! One directory per run, `<log_dir>/<YYYYmmdd_HHMMSS>[-N]/`, holding:
//! - `events.jsonl`: one structured event per line
//! - `commands.log`: every subprocess with its full output
//! - `summary.txt` and `run_summary.json`: written once at the end
//!
//! Files are append-only and a run directory is never reused.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::process::{CommandOutput, Invocation};
use crate::state::PhaseName;
use crate::summary::RunReport;

pub const EVENTS_FILE: &str = "events.jsonl";
pub const COMMANDS_FILE: &str = "commands.log";
pub const SUMMARY_TEXT_FILE: &str = "summary.txt";
pub const SUMMARY_JSON_FILE: &str = "run_summary.json";

/// Run log errors
#[derive(Debug, thiserror::Error)]
pub enum RunLogError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("run log lock poisoned")]
    Poisoned,
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// One line of events.jsonl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<PhaseName>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Append-only sink for one run
#[derive(Debug)]
pub struct RunLog {
    dir: PathBuf,
    seq: AtomicU64,
    events: Mutex<File>,
    commands: Mutex<File>,
}

impl RunLog {
    /// Create a fresh run directory under `log_root`
    pub fn create(log_root: &Path) -> Result<Self, RunLogError> {
        Self::create_at(log_root, Local::now())
    }

    /// Create a fresh run directory named after `now`
    pub fn create_at(log_root: &Path, now: DateTime<Local>) -> Result<Self, RunLogError> {
        fs::create_dir_all(log_root).map_err(|source| RunLogError::Io {
            path: log_root.to_path_buf(),
            source,
        })?;

        let stamp = now.format("%Y%m%d_%H%M%S").to_string();
        let mut attempt = 0u32;
        let dir = loop {
            let name = if attempt == 0 {
                stamp.clone()
            } else {
                format!("{}-{}", stamp, attempt)
            };
            let candidate = log_root.join(name);
            match fs::create_dir(&candidate) {
                Ok(()) => break candidate,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => {
                    return Err(RunLogError::Io {
                        path: candidate,
                        source,
                    })
                }
            }
        };

        let events = open_append(&dir.join(EVENTS_FILE))?;
        let commands = open_append(&dir.join(COMMANDS_FILE))?;

        Ok(Self {
            dir,
            seq: AtomicU64::new(0),
            events: Mutex::new(events),
            commands: Mutex::new(commands),
        })
    }

    /// Run directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append a structured event
    pub fn event(
        &self,
        level: EventLevel,
        phase: Option<PhaseName>,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Result<(), RunLogError> {
        let event = RunEvent {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            level,
            phase,
            message: message.into(),
            data,
        };
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let mut file = self.events.lock().map_err(|_| RunLogError::Poisoned)?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|source| RunLogError::Io {
                path: self.dir.join(EVENTS_FILE),
                source,
            })
    }

    /// Append a command and its outcome to the transcript
    pub fn record_command(
        &self,
        invocation: &Invocation,
        result: Result<&CommandOutput, &str>,
    ) -> Result<(), RunLogError> {
        let mut entry = format!(
            "=== {} ===\n$ {}\n",
            Utc::now().to_rfc3339(),
            invocation
        );
        if let Some(cwd) = &invocation.cwd {
            entry.push_str(&format!("(cwd: {})\n", cwd.display()));
        }
        match result {
            Ok(output) => {
                entry.push_str(&output.stdout);
                if !output.stdout.is_empty() && !output.stdout.ends_with('\n') {
                    entry.push('\n');
                }
                if !output.stderr.is_empty() {
                    entry.push_str("--- stderr ---\n");
                    entry.push_str(&output.stderr);
                    if !output.stderr.ends_with('\n') {
                        entry.push('\n');
                    }
                }
                entry.push_str(&format!("exit code: {}\n\n", output.exit_code));
            }
            Err(message) => {
                entry.push_str(&format!("launch failed: {}\n\n", message));
            }
        }

        let mut file = self.commands.lock().map_err(|_| RunLogError::Poisoned)?;
        file.write_all(entry.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|source| RunLogError::Io {
                path: self.dir.join(COMMANDS_FILE),
                source,
            })
    }

    /// Write summary.txt and run_summary.json (once per run)
    pub fn write_summary(&self, report: &RunReport) -> Result<(), RunLogError> {
        write_new(&self.dir.join(SUMMARY_TEXT_FILE), report.to_text().as_bytes())?;
        write_new(&self.dir.join(SUMMARY_JSON_FILE), report.to_json()?.as_bytes())
    }
}

fn open_append(path: &Path) -> Result<File, RunLogError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| RunLogError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn write_new(path: &Path, bytes: &[u8]) -> Result<(), RunLogError> {
    let io_err = |source| RunLogError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)
}
