//! Conflict records seam
//!
//! Conflicts are detected and stored by the engine's per-job metadata
//! database; the control-plane only lists them and records resolutions.
//! [`FileConflictStore`] is the file-backed default used when no richer
//! database handler is plugged in.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result, SyncHubError};

const CONFLICTS_FILE: &str = "conflicts.json";

/// Resolution state of one conflicted node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Waiting for a decision
    #[default]
    Unresolved,
    /// Local copy wins
    SolvedLocal,
    /// Remote copy wins
    SolvedRemote,
    /// Keep both copies
    SolvedBoth,
}

impl ConflictStatus {
    /// Whether this status still needs a decision
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }
}

/// One file-state disagreement between the local and remote copies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictNode {
    /// Workspace-relative path of the node
    pub node_path: String,
    /// Current resolution state
    #[serde(default)]
    pub status: ConflictStatus,
    /// Local modification time, seconds since epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_mtime: Option<i64>,
    /// Remote modification time, seconds since epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_mtime: Option<i64>,
}

/// Per-job conflict database handler
pub trait ConflictHandler: Send + Sync {
    /// All conflict records for the job
    fn list_conflicts(&self) -> Result<Vec<ConflictNode>>;

    /// Record a resolution for one node
    fn update_status(&self, node_path: &str, status: ConflictStatus) -> Result<()>;

    /// Conflicts still waiting for a decision
    fn count_unresolved(&self) -> Result<usize>;
}

/// JSON-file-backed conflict store inside the job's data directory
pub struct FileConflictStore {
    path: PathBuf,
}

impl FileConflictStore {
    /// Attach to a job's data directory
    pub fn new(job_data_path: impl Into<PathBuf>) -> Self {
        Self {
            path: job_data_path.into().join(CONFLICTS_FILE),
        }
    }

    fn read(&self) -> Result<Vec<ConflictNode>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).with_path(&self.path)?;
        serde_json::from_str(&content)
            .map_err(|e| SyncHubError::persistence(&self.path, e.to_string()))
    }

    fn write(&self, nodes: &[ConflictNode]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        let content = serde_json::to_string_pretty(nodes)
            .map_err(|e| SyncHubError::persistence(&self.path, e.to_string()))?;
        fs::write(&self.path, content).with_path(&self.path)?;
        Ok(())
    }
}

impl ConflictHandler for FileConflictStore {
    fn list_conflicts(&self) -> Result<Vec<ConflictNode>> {
        self.read()
    }

    fn update_status(&self, node_path: &str, status: ConflictStatus) -> Result<()> {
        let mut nodes = self.read()?;
        match nodes.iter_mut().find(|n| n.node_path == node_path) {
            Some(node) => node.status = status,
            None => nodes.push(ConflictNode {
                node_path: node_path.to_string(),
                status,
                local_mtime: None,
                remote_mtime: None,
            }),
        }
        // Resolved nodes stay in the record until the next sync cycle
        // reconciles them; only the unresolved count gates a run-now.
        self.write(&nodes)
    }

    fn count_unresolved(&self) -> Result<usize> {
        Ok(self
            .read()?
            .iter()
            .filter(|n| n.status.is_unresolved())
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = FileConflictStore::new(dir.path());
        assert!(store.list_conflicts().unwrap().is_empty());
        assert_eq!(store.count_unresolved().unwrap(), 0);
    }

    #[test]
    fn test_update_and_count() {
        let dir = TempDir::new().unwrap();
        let store = FileConflictStore::new(dir.path());

        store
            .update_status("/docs/report.txt", ConflictStatus::Unresolved)
            .unwrap();
        store
            .update_status("/docs/notes.txt", ConflictStatus::Unresolved)
            .unwrap();
        assert_eq!(store.count_unresolved().unwrap(), 2);

        store
            .update_status("/docs/report.txt", ConflictStatus::SolvedLocal)
            .unwrap();
        assert_eq!(store.count_unresolved().unwrap(), 1);

        store
            .update_status("/docs/notes.txt", ConflictStatus::SolvedRemote)
            .unwrap();
        assert_eq!(store.count_unresolved().unwrap(), 0);
        assert_eq!(store.list_conflicts().unwrap().len(), 2);
    }

    #[test]
    fn test_status_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileConflictStore::new(dir.path());
        store
            .update_status("/a", ConflictStatus::SolvedBoth)
            .unwrap();

        let reopened = FileConflictStore::new(dir.path());
        let nodes = reopened.list_conflicts().unwrap();
        assert_eq!(nodes[0].status, ConflictStatus::SolvedBoth);
    }
}
