//! Control-plane request handlers
//!
//! One handler per API operation. All registry access goes through a single
//! mutex so every read-modify-write sequence (disable → clear → enable)
//! appears atomic to concurrent requests; the registry itself is
//! unsynchronized.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{info, warn};

use crate::api::models::{
    CommandResponse, ConflictResolutionRequest, JobView, LogsResponse, PathSuggestion,
    SizeEstimate, StatusResponse,
};
use crate::engine::{ConflictHandler, EventLogger, FileConflictStore, JobScheduler};
use crate::error::{Result, SyncHubError};
use crate::job::{JobConfig, JobDescriptor, JobRegistry};
use crate::remote::{DiscoveryTarget, Endpoint, FolderNode, RemoteClient, RemoteError, WorkspaceListing};
use crate::secrets::CredentialStore;

/// Nominal line rates used by the `compute_sizes` pre-check, bytes/second
const DOWNLINK_RATE: f64 = 2.0 * 1024.0 * 1024.0;
const UPLINK_RATE: f64 = 0.1 * 1024.0 * 1024.0;

/// Folder-tree depth bound applied to ad-hoc probes
const PROBE_MAX_DEPTH: u32 = 2;

/// Shared state behind the control-plane API
pub struct AppState {
    /// Job registry; the mutex serializes all read-modify-write sequences
    pub registry: Mutex<JobRegistry>,
    /// Process-wide credential store
    pub credentials: Arc<dyn CredentialStore>,
    /// Engine scheduler seam
    pub scheduler: Arc<dyn JobScheduler>,
    /// Remote discovery proxy
    pub remote: RemoteClient,
    /// Parent directory suggested for new job directories
    pub default_parent: PathBuf,
    /// Aggregate connectivity flag, maintained from remote-call outcomes
    online: AtomicBool,
}

impl AppState {
    /// Assemble the state from its explicitly owned services
    pub fn new(
        registry: JobRegistry,
        credentials: Arc<dyn CredentialStore>,
        scheduler: Arc<dyn JobScheduler>,
        remote: RemoteClient,
        default_parent: PathBuf,
    ) -> Self {
        Self {
            registry: Mutex::new(registry),
            credentials,
            scheduler,
            remote,
            default_parent,
            online: AtomicBool::new(true),
        }
    }

    /// Latest known connectivity
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    fn note_remote_outcome<T>(&self, outcome: &std::result::Result<T, RemoteError>) {
        match outcome {
            Ok(_) => self.online.store(true, Ordering::Relaxed),
            Err(RemoteError::Timeout) | Err(RemoteError::Connection) => {
                self.online.store(false, Ordering::Relaxed)
            }
            // Any HTTP answer means the network itself is up.
            Err(_) => self.online.store(true, Ordering::Relaxed),
        }
    }

    fn job_data_path(&self, job_id: &str) -> PathBuf {
        self.registry
            .lock()
            .expect("registry mutex poisoned")
            .job_data_path(job_id)
    }

    fn conflict_handler(&self, job_id: &str) -> FileConflictStore {
        FileConflictStore::new(self.job_data_path(job_id))
    }

    fn event_logger(&self, job_id: &str) -> EventLogger {
        EventLogger::new(self.job_data_path(job_id))
    }

    fn enrich(&self, job: JobConfig, with_notification: bool) -> JobView {
        let running = self.scheduler.is_job_running(&job.id);
        let logger = self.event_logger(&job.id);
        let last_event = logger.get_all(1, 0).into_iter().next();
        let notification = if with_notification {
            logger.consume_notification()
        } else {
            None
        };
        let state = if running {
            self.scheduler.job_progress(&job.id)
        } else {
            None
        };
        JobView {
            job,
            running,
            last_event,
            state,
            notification,
        }
    }
}

/// Handler for `GET /jobs`
pub fn handle_list_jobs(state: &AppState) -> Result<Vec<JobView>> {
    let jobs: Vec<JobConfig> = {
        let mut registry = state.registry.lock().expect("registry mutex poisoned");
        registry.get_all()?.values().cloned().collect()
    };
    let mut views: Vec<JobView> = jobs
        .into_iter()
        .map(|job| state.enrich(job, false))
        .collect();
    views.sort_by(|a, b| a.job.id.cmp(&b.job.id));
    Ok(views)
}

/// Handler for `GET /jobs-status`
pub fn handle_jobs_status(state: &AppState) -> Result<StatusResponse> {
    let jobs: Vec<JobConfig> = {
        let mut registry = state.registry.lock().expect("registry mutex poisoned");
        registry.get_all()?.values().cloned().collect()
    };
    let mut views: Vec<JobView> = jobs
        .into_iter()
        .map(|job| state.enrich(job, true))
        .collect();
    views.sort_by(|a, b| a.job.id.cmp(&b.job.id));
    Ok(StatusResponse {
        is_connected_to_internet: state.is_online(),
        jobs: views,
    })
}

/// Handler for `GET /jobs/{id}`
pub fn handle_get_job(state: &AppState, job_id: &str) -> Result<JobView> {
    let job = {
        let mut registry = state.registry.lock().expect("registry mutex poisoned");
        registry.get(job_id)?.clone()
    };
    Ok(state.enrich(job, false))
}

/// Handler for `POST /jobs`: create, update, or pre-check
///
/// Pre-check markers short-circuit without touching the registry. A real
/// create/update holds the registry mutex across the whole
/// persist → reload → disable → clear → enable sequence so a reconfigured
/// job can never resume against stale sync state.
pub fn handle_upsert_job(state: &AppState, body: &str) -> Result<Value> {
    let descriptor: JobDescriptor = serde_json::from_str(body)
        .map_err(|e| SyncHubError::validation(format!("malformed job descriptor: {}", e)))?;

    if descriptor.test_path {
        return handle_test_path(state, &descriptor);
    }
    if descriptor.compute_sizes {
        return handle_compute_sizes(state, &descriptor);
    }

    let mut registry = state.registry.lock().expect("registry mutex poisoned");
    let (job, password) = descriptor
        .clone()
        .into_config(|id| registry.contains(id))?;
    if let Some(password) = password {
        state.credentials.set(&job.server, &job.user_id, &password);
    }

    registry.upsert(job.clone())?;
    state.scheduler.reload();
    state.scheduler.disable_job(&job.id);
    if !descriptor.toggle_status {
        registry.clear_data(&job.id)?;
    }
    state.scheduler.enable_job(&job.id);
    info!("job '{}' persisted and re-enabled", job.id);

    Ok(serde_json::to_value(&job).expect("job serializes"))
}

fn handle_test_path(state: &AppState, descriptor: &JobDescriptor) -> Result<Value> {
    let name = descriptor
        .label
        .clone()
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| descriptor.workspace.clone());
    if name.is_empty() {
        return Err(SyncHubError::validation(
            "test_path needs a label or workspace",
        ));
    }
    let suggestion = PathSuggestion {
        directory: state
            .default_parent
            .join(name)
            .to_string_lossy()
            .into_owned(),
    };
    Ok(serde_json::to_value(suggestion).expect("suggestion serializes"))
}

fn handle_compute_sizes(state: &AppState, descriptor: &JobDescriptor) -> Result<Value> {
    if descriptor.server.is_empty() || descriptor.workspace.is_empty() {
        return Err(SyncHubError::validation(
            "compute_sizes needs server and workspace",
        ));
    }
    let password = descriptor.password.clone().or_else(|| {
        state
            .credentials
            .get(&descriptor.server, &descriptor.user_id)
    });
    let endpoint = Endpoint::new(
        &descriptor.server,
        &descriptor.user_id,
        password.as_deref().unwrap_or(""),
        descriptor.trust_ssl.unwrap_or(false),
    );

    let remote = state
        .remote
        .estimate_workspace_size(&endpoint, &descriptor.workspace);
    state.note_remote_outcome(&remote);
    let remote_bytes = remote?;

    let mut local_bytes = 0u64;
    let directory = PathBuf::from(&descriptor.directory);
    if directory.exists() {
        for entry in walkdir::WalkDir::new(&directory)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if let Ok(meta) = entry.metadata() {
                local_bytes += meta.len();
            }
        }
    }

    let estimate = SizeEstimate {
        byte_size: remote_bytes + local_bytes,
        eta: remote_bytes as f64 * 8.0 / DOWNLINK_RATE + local_bytes as f64 * 8.0 / UPLINK_RATE,
    };
    Ok(serde_json::to_value(estimate).expect("estimate serializes"))
}

/// Handler for `DELETE /jobs/{id}`
pub fn handle_delete_job(state: &AppState, job_id: &str) -> Result<()> {
    let mut registry = state.registry.lock().expect("registry mutex poisoned");
    // Deleting an unknown id is a 404, not a silent success.
    registry.get(job_id)?;
    registry.delete(job_id)?;
    state.scheduler.reload();
    state.scheduler.disable_job(job_id);
    registry.purge_data(job_id)?;
    info!("job '{}' deleted", job_id);
    Ok(())
}

/// Handler for `GET /jobs/{id}/logs`
pub fn handle_job_logs(
    state: &AppState,
    job_id: &str,
    query: &HashMap<String, String>,
) -> Result<LogsResponse> {
    {
        let mut registry = state.registry.lock().expect("registry mutex poisoned");
        registry.get(job_id)?;
    }
    let logger = state.event_logger(job_id);
    let logs = match query.iter().next() {
        None => logger.get_all(20, 0),
        Some((field, value)) => logger.filter(field, value),
    };
    Ok(LogsResponse {
        logs,
        running: state.scheduler.job_progress(job_id),
    })
}

/// Handler for `GET /jobs/{id}/conflicts`
pub fn handle_list_conflicts(state: &AppState, job_id: &str) -> Result<Value> {
    {
        let mut registry = state.registry.lock().expect("registry mutex poisoned");
        registry.get(job_id)?;
    }
    let nodes = state.conflict_handler(job_id).list_conflicts()?;
    Ok(serde_json::to_value(nodes).expect("conflicts serialize"))
}

/// Handler for `POST /jobs/{id}/conflicts` and `POST /jobs/conflicts`
///
/// Records the resolution. When no conflict remains and the job is active,
/// asks the worker for an immediate out-of-schedule run.
pub fn handle_resolve_conflict(state: &AppState, body: &str) -> Result<Value> {
    let request: ConflictResolutionRequest = serde_json::from_str(body)
        .map_err(|e| SyncHubError::validation(format!("malformed resolution: {}", e)))?;

    let job = {
        let mut registry = state.registry.lock().expect("registry mutex poisoned");
        registry.get(&request.job_id)?.clone()
    };

    let handler = state.conflict_handler(&request.job_id);
    handler.update_status(&request.node_path, request.status)?;
    if handler.count_unresolved()? == 0 && job.active {
        info!("job '{}' conflict-free again, requesting a run", job.id);
        state.scheduler.run_now(&job.id);
    }
    Ok(serde_json::json!({
        "job_id": request.job_id,
        "node_path": request.node_path,
        "status": request.status,
    }))
}

/// Handler for `GET /cmd/{cmd}/{id}` and `GET /cmd/{cmd}`
pub fn handle_command(state: &AppState, cmd: &str, job_id: Option<&str>) -> Result<CommandResponse> {
    match job_id {
        Some(job_id) => {
            if cmd == "enable" || cmd == "disable" {
                let mut registry = state.registry.lock().expect("registry mutex poisoned");
                let mut job = registry.get(job_id)?.clone();
                job.active = cmd == "enable";
                registry.upsert(job)?;
                state.scheduler.reload();
            }
            state.scheduler.signal_job(cmd, job_id)?;
        }
        None => state.scheduler.signal(cmd)?,
    }
    Ok(CommandResponse::success())
}

/// Resolve a discovery target into a concrete endpoint
///
/// Registered jobs use stored credentials; ad-hoc probes carry inline
/// parameters, falling back to the store when the secret is omitted.
fn resolve_endpoint(
    state: &AppState,
    target: &DiscoveryTarget,
) -> Result<(Endpoint, Option<String>)> {
    match target {
        DiscoveryTarget::Registered { id } => {
            let job = {
                let mut registry = state.registry.lock().expect("registry mutex poisoned");
                registry.get(id)?.clone()
            };
            let password = state
                .credentials
                .get(&job.server, &job.user_id)
                .unwrap_or_default();
            Ok((
                Endpoint::new(&job.server, &job.user_id, &password, job.trust_ssl),
                Some(job.workspace),
            ))
        }
        DiscoveryTarget::AdHoc {
            url,
            user,
            password,
            trust_ssl,
            workspace,
        } => {
            let base = url.trim_end_matches('/');
            let secret = password
                .clone()
                .or_else(|| state.credentials.get(base, user))
                .unwrap_or_default();
            Ok((
                Endpoint::new(base, user, &secret, *trust_ssl),
                workspace.clone(),
            ))
        }
    }
}

/// Handler for `GET /ws/{id}`
pub fn handle_workspaces(state: &AppState, target: &DiscoveryTarget) -> Result<WorkspaceListing> {
    let (endpoint, _) = resolve_endpoint(state, target)?;
    let outcome = state.remote.list_workspaces(&endpoint);
    state.note_remote_outcome(&outcome);
    if let Err(e) = &outcome {
        warn!("workspace discovery against {} failed: {}", endpoint.base, e);
    }
    Ok(outcome?)
}

/// Handler for `GET /folders/{id}`
pub fn handle_folders(state: &AppState, target: &DiscoveryTarget) -> Result<Vec<FolderNode>> {
    let (endpoint, workspace) = resolve_endpoint(state, target)?;
    let workspace = workspace
        .ok_or_else(|| SyncHubError::validation("folder listing needs a workspace"))?;
    let max_depth = match target {
        DiscoveryTarget::AdHoc { .. } => Some(PROBE_MAX_DEPTH),
        DiscoveryTarget::Registered { .. } => None,
    };
    let outcome = state.remote.folder_tree(&endpoint, &workspace, max_depth);
    state.note_remote_outcome(&outcome);
    Ok(outcome?)
}
