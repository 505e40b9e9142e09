//! API request/response models
//!
//! Public projections of control-plane state. A [`JobView`] is the persisted
//! job descriptor (never a password) enriched with live scheduler and event
//! data.

use serde::{Deserialize, Serialize};

use crate::engine::{ConflictStatus, Notification, SyncEvent, SyncProgress};
use crate::job::JobConfig;

/// One job as reported to front-ends
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    /// The persisted configuration (credentials are never part of it)
    #[serde(flatten)]
    pub job: JobConfig,
    /// Whether a sync cycle is executing right now
    pub running: bool,
    /// Latest event from the job's log, when any exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event: Option<SyncEvent>,
    /// Progress of the running cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SyncProgress>,
    /// One-shot notification; only present on status views, consumed on read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
}

/// Envelope of `GET /jobs-status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    /// Aggregate connectivity flag maintained from remote-call outcomes
    pub is_connected_to_internet: bool,
    /// All jobs with status enrichment
    pub jobs: Vec<JobView>,
}

/// Envelope of `GET /jobs/{id}/logs`
#[derive(Debug, Clone, Serialize)]
pub struct LogsResponse {
    /// Selected events, newest first
    pub logs: Vec<SyncEvent>,
    /// Progress of the running cycle, if one is executing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running: Option<SyncProgress>,
}

/// Body of `POST /jobs/{id}/conflicts`
#[derive(Debug, Clone, Deserialize)]
pub struct ConflictResolutionRequest {
    /// Job the conflicted node belongs to
    pub job_id: String,
    /// Workspace-relative path of the node
    pub node_path: String,
    /// Decision taken by the user or policy
    pub status: ConflictStatus,
}

/// Ephemeral answer to a `test_path` pre-check
#[derive(Debug, Clone, Serialize)]
pub struct PathSuggestion {
    /// Local directory the agent would use for this job
    pub directory: String,
}

/// Ephemeral answer to a `compute_sizes` pre-check
#[derive(Debug, Clone, Serialize)]
pub struct SizeEstimate {
    /// Remote plus local bytes the first cycle would touch
    pub byte_size: u64,
    /// Rough transfer time in seconds at nominal line rates
    pub eta: f64,
}

/// Result envelope for `/cmd/...` calls
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    /// Always `"success"`; failures travel as error responses
    pub status: &'static str,
}

impl CommandResponse {
    /// The one successful shape
    pub fn success() -> Self {
        Self { status: "success" }
    }
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Stable human-readable message; part of the API contract for
    /// remote-proxy failures
    pub error: String,
}

impl ApiError {
    /// Wrap a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_job_view_flattens_config_without_password_field() {
        let mut job = JobConfig {
            id: "ex.com-ws1".into(),
            server: "https://ex.com".into(),
            workspace: "ws1".into(),
            remote_folder: String::new(),
            directory: PathBuf::from("/tmp/d"),
            user_id: "alice".into(),
            label: String::new(),
            direction: Default::default(),
            frequency: Default::default(),
            start_time: Default::default(),
            solve: Default::default(),
            trust_ssl: false,
            active: true,
            filters: Default::default(),
            monitor: false,
        };
        job.normalize();
        let view = JobView {
            job,
            running: false,
            last_event: None,
            state: None,
            notification: None,
        };
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["id"], "ex.com-ws1");
        assert_eq!(value["user"], "alice");
        assert_eq!(value["running"], false);
        assert!(value.get("password").is_none());
        assert!(value.get("monitor").is_none());
        assert!(value.get("last_event").is_none());
    }
}
