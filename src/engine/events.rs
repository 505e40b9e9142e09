//! Per-job event log
//!
//! Append-only JSONL log inside the job's data directory, plus a one-shot
//! notification file consumed by status views. Sync workers append; the
//! control-plane reads.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{IoResultExt, Result};

const EVENTS_FILE: &str = "events.jsonl";
const NOTIFICATION_FILE: &str = "notification.json";

/// One synchronization event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    /// When the event happened
    pub timestamp: DateTime<Utc>,
    /// Event class: `sync`, `error`, `conflict`, …
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Source path, when the event concerns one file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Target path, when the event concerns one file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// A one-shot notification surfaced once to the status view, then dropped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Severity: `info`, `warning`, `error`
    pub level: String,
    /// Message for the front-end
    pub message: String,
    /// When it was raised
    pub timestamp: DateTime<Utc>,
}

/// Reader/writer for one job's event log
pub struct EventLogger {
    job_data_path: PathBuf,
}

impl EventLogger {
    /// Attach to a job's data directory
    pub fn new(job_data_path: impl Into<PathBuf>) -> Self {
        Self {
            job_data_path: job_data_path.into(),
        }
    }

    fn events_file(&self) -> PathBuf {
        self.job_data_path.join(EVENTS_FILE)
    }

    /// Append an event
    pub fn log(&self, event: &SyncEvent) -> Result<()> {
        fs::create_dir_all(&self.job_data_path).with_path(&self.job_data_path)?;
        let path = self.events_file();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_path(&path)?;
        let mut line = serde_json::to_string(event).unwrap_or_default();
        line.push('\n');
        file.write_all(line.as_bytes()).with_path(&path)?;
        Ok(())
    }

    /// Most recent events, newest first
    ///
    /// Unparsable lines are skipped with a warning rather than failing the
    /// read; a half-written trailing line must not break the log view.
    pub fn get_all(&self, limit: usize, offset: usize) -> Vec<SyncEvent> {
        let path = self.events_file();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };
        let mut events: Vec<SyncEvent> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("skipping bad event line in {:?}: {}", path, e);
                    None
                }
            })
            .collect();
        events.reverse();
        events.into_iter().skip(offset).take(limit).collect()
    }

    /// Events whose named field matches `value`
    pub fn filter(&self, field: &str, value: &str) -> Vec<SyncEvent> {
        self.get_all(usize::MAX, 0)
            .into_iter()
            .filter(|event| match field {
                "kind" => event.kind == value,
                "source" => event.source.as_deref() == Some(value),
                "target" => event.target.as_deref() == Some(value),
                "message" => event.message.contains(value),
                _ => false,
            })
            .collect()
    }

    /// Raise a notification, replacing any pending one
    pub fn notify(&self, level: &str, message: &str) -> Result<()> {
        fs::create_dir_all(&self.job_data_path).with_path(&self.job_data_path)?;
        let notification = Notification {
            level: level.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        };
        let path = self.job_data_path.join(NOTIFICATION_FILE);
        let body = serde_json::to_string(&notification).unwrap_or_default();
        fs::write(&path, body).with_path(&path)?;
        Ok(())
    }

    /// Take the pending notification, if any; it is consumed exactly once
    pub fn consume_notification(&self) -> Option<Notification> {
        let path = self.job_data_path.join(NOTIFICATION_FILE);
        let content = fs::read_to_string(&path).ok()?;
        let _ = fs::remove_file(&path);
        serde_json::from_str(&content).ok()
    }

    /// The directory this logger reads from
    pub fn path(&self) -> &Path {
        &self.job_data_path
    }
}
