//! Event log collaborator
//!
//! Every component reports human-readable events through [`EventLogger`].
//! Implementations must never panic and must stay cheap, since the gamepad
//! poll loop may log on every tick.

pub mod journal;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub use journal::Journal;

/// A single logged event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub is_error: bool,
}

impl LogEntry {
    pub fn new(message: impl Into<String>, is_error: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            is_error,
        }
    }

    /// `[HH:MM:SS] ERROR: message` in local time
    pub fn render(&self) -> String {
        let time = self
            .timestamp
            .with_timezone(&chrono::Local)
            .format("%H:%M:%S");
        if self.is_error {
            format!("[{}] ERROR: {}", time, self.message)
        } else {
            format!("[{}] {}", time, self.message)
        }
    }
}

/// Sink for operator-facing events
pub trait EventLogger: Send + Sync {
    fn log(&self, message: &str, is_error: bool);
}

/// Logs events through `tracing` only
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl EventLogger for TracingLogger {
    fn log(&self, message: &str, is_error: bool) {
        if is_error {
            error!(target: "rig", "{}", message);
        } else {
            info!(target: "rig", "{}", message);
        }
    }
}

/// Logs through `tracing` and appends every entry to the persistent journal
#[derive(Clone)]
pub struct JournalLogger {
    journal: Journal,
}

impl JournalLogger {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

impl EventLogger for JournalLogger {
    fn log(&self, message: &str, is_error: bool) {
        TracingLogger.log(message, is_error);
        if let Err(e) = self.journal.append(&LogEntry::new(message, is_error)) {
            warn!("Failed to persist log entry: {:#}", e);
        }
    }
}

/// Keeps entries in memory; used by tests and diagnostics
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.message.clone()).collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.is_error)
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.lock().iter().any(|e| e.message.contains(needle))
    }
}

impl EventLogger for MemoryLogger {
    fn log(&self, message: &str, is_error: bool) {
        self.entries.lock().push(LogEntry::new(message, is_error));
    }
}
