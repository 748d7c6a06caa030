//! Persistent event journal backed by sled
//!
//! Entries are keyed by a monotonically increasing id so iteration order is
//! append order. The journal can be rendered as text and exported to a
//! timestamped file for download.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::LogEntry;

/// Name of the sled tree holding log entries
const LOG_TREE: &str = "logs";

#[derive(Clone)]
pub struct Journal {
    tree: sled::Tree,
    db: sled::Db,
}

impl Journal {
    /// Open (or create) the journal database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .with_context(|| format!("Failed to open log journal at {}", path.display()))?;
        Self::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<Self> {
        let tree = db
            .open_tree(LOG_TREE)
            .context("Failed to open log journal tree")?;
        debug!("Log journal opened with {} entries", tree.len());
        Ok(Self { tree, db })
    }

    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        let id = self
            .db
            .generate_id()
            .context("Failed to allocate journal id")?;
        let value = serde_json::to_vec(entry).context("Failed to serialize log entry")?;
        self.tree
            .insert(id.to_be_bytes(), value)
            .context("Failed to persist log entry")?;
        Ok(())
    }

    /// All entries, oldest first; undecodable records are skipped
    pub fn entries(&self) -> Result<Vec<LogEntry>> {
        let mut entries = Vec::with_capacity(self.tree.len());
        for item in self.tree.iter() {
            let (_, value) = item.context("Failed to read log journal")?;
            match serde_json::from_slice::<LogEntry>(&value) {
                Ok(entry) => entries.push(entry),
                Err(e) => debug!("Skipping undecodable journal record: {}", e),
            }
        }
        Ok(entries)
    }

    /// The last `count` entries, oldest first
    pub fn recent(&self, count: usize) -> Result<Vec<LogEntry>> {
        let entries = self.entries()?;
        let skip = entries.len().saturating_sub(count);
        Ok(entries.into_iter().skip(skip).collect())
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush().context("Failed to flush log journal")?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.tree.clear().context("Failed to clear log journal")?;
        info!("Log journal cleared");
        Ok(())
    }

    /// One rendered line per entry
    pub fn render_text(&self) -> Result<String> {
        let mut text = String::new();
        for entry in self.entries()? {
            text.push_str(&entry.render());
            text.push('\n');
        }
        Ok(text)
    }

    /// Write the journal to `dir` as `YYYYMMDD-HHMMSS_controller_log.txt`
    ///
    /// Returns `None` when there is nothing to export.
    pub async fn export(&self, dir: impl AsRef<Path>, now: DateTime<Local>) -> Result<Option<PathBuf>> {
        let text = self.render_text()?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create export directory {}", dir.display()))?;
        let path = dir.join(export_file_name(now));
        tokio::fs::write(&path, text)
            .await
            .with_context(|| format!("Failed to write log export {}", path.display()))?;

        info!("Log journal exported to {}", path.display());
        Ok(Some(path))
    }
}

pub fn export_file_name(now: DateTime<Local>) -> String {
    format!("{}_controller_log.txt", now.format("%Y%m%d-%H%M%S"))
}
