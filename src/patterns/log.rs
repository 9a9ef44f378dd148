//! Write-through feedback log: one JSON object per line, append-only.
//!
//! The log is the durable form of the pattern store: counters are
//! rebuilt by replaying events through the same update path used for
//! live feedback, so recovery cannot drift from normal operation.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One confirm/reject observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub ts_ms: u64,
    pub entity_key: String,
    pub action: String,
    pub confirmed: bool,
}

impl FeedbackEvent {
    pub fn now(entity_key: impl Into<String>, action: impl Into<String>, confirmed: bool) -> Self {
        let ts_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            ts_ms,
            entity_key: entity_key.into(),
            action: action.into(),
            confirmed,
        }
    }
}

/// Append-only JSONL log with serialized writers.
pub struct FeedbackLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FeedbackLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event. Writers are serialized so concurrent feedback
    /// cannot interleave partial lines.
    pub async fn append(&self, event: &FeedbackEvent) -> io::Result<()> {
        let mut line = serde_json::to_string(event).map_err(io::Error::other)?;
        line.push('\n');

        let _lock = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Read all events from a log file. A missing file is an empty log;
    /// malformed lines are skipped with a warning rather than discarding
    /// the readable remainder.
    pub async fn replay(path: &Path) -> io::Result<Vec<FeedbackEvent>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let content = String::from_utf8_lossy(&bytes);
        let mut events = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<FeedbackEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(line = idx + 1, "feedback log: skipping malformed line: {e}");
                }
            }
        }
        Ok(events)
    }
}
