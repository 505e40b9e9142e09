//! Durable job registry
//!
//! In-memory mapping of job id → [`JobConfig`] backed by a single JSON
//! document, rewritten whole on every mutation through a temp-file rename so
//! readers never observe a partial document. The registry carries no lock of
//! its own: the API layer serializes read-modify-write sequences.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{IoResultExt, Result, SyncHubError};
use crate::job::config::JobConfig;

/// Sync-state artifacts cleared when a job is reconfigured
const SYNC_STATE_FILES: &[&str] = &["sequences.json", "state.db"];

/// Durable store of all job descriptors
pub struct JobRegistry {
    config_file: PathBuf,
    data_path: PathBuf,
    jobs: Option<HashMap<String, JobConfig>>,
}

impl JobRegistry {
    /// Create a registry rooted at `data_path`, using the default
    /// `configs.json` document inside it
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        let data_path = data_path.into();
        let config_file = data_path.join("configs.json");
        Self {
            config_file,
            data_path,
            jobs: None,
        }
    }

    /// Create a registry with an alternate document location
    pub fn with_config_file(data_path: impl Into<PathBuf>, config_file: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            data_path: data_path.into(),
            jobs: None,
        }
    }

    /// Root directory holding the per-job data directories
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Read the document from disk
    ///
    /// A missing document means an empty registry, not an error. Each record
    /// gets the defaulting/derivation rules applied; unknown keys in the
    /// document are tolerated.
    pub fn load(&mut self) -> Result<()> {
        if !self.config_file.exists() {
            debug!("no registry document at {:?}, starting empty", self.config_file);
            self.jobs = Some(HashMap::new());
            return Ok(());
        }
        let content = fs::read_to_string(&self.config_file).with_path(&self.config_file)?;
        let mut jobs: HashMap<String, JobConfig> = serde_json::from_str(&content)
            .map_err(|e| SyncHubError::persistence(&self.config_file, e.to_string()))?;
        for job in jobs.values_mut() {
            job.normalize();
        }
        info!("loaded {} job(s) from {:?}", jobs.len(), self.config_file);
        self.jobs = Some(jobs);
        Ok(())
    }

    fn ensure_loaded(&mut self) -> Result<&mut HashMap<String, JobConfig>> {
        if self.jobs.is_none() {
            self.load()?;
        }
        Ok(self.jobs.as_mut().expect("registry loaded"))
    }

    /// All jobs, keyed by id
    pub fn get_all(&mut self) -> Result<&HashMap<String, JobConfig>> {
        Ok(self.ensure_loaded()?)
    }

    /// One job by id
    pub fn get(&mut self, id: &str) -> Result<&JobConfig> {
        self.ensure_loaded()?
            .get(id)
            .ok_or_else(|| SyncHubError::JobNotFound(id.to_string()))
    }

    /// Membership check used during identity generation
    pub fn contains(&mut self, id: &str) -> bool {
        self.ensure_loaded()
            .map(|jobs| jobs.contains_key(id))
            .unwrap_or(false)
    }

    /// Insert or replace a job, ensure its data directory exists, persist
    pub fn upsert(&mut self, job: JobConfig) -> Result<()> {
        let data_dir = self.job_data_path(&job.id);
        fs::create_dir_all(&data_dir).with_path(&data_dir)?;
        self.ensure_loaded()?.insert(job.id.clone(), job);
        self.save()
    }

    /// Remove a job if present, persist
    pub fn delete(&mut self, id: &str) -> Result<()> {
        if self.ensure_loaded()?.remove(id).is_some() {
            self.save()?;
        }
        Ok(())
    }

    /// Per-job data directory
    pub fn job_data_path(&self, id: &str) -> PathBuf {
        self.data_path.join(id)
    }

    /// Remove a job's sync-state artifacts, keeping the directory and
    /// everything else in it (event logs, conflict records)
    ///
    /// Invoked when a job is reconfigured so it never resumes against stale
    /// local state.
    pub fn clear_data(&self, id: &str) -> Result<()> {
        let dir = self.job_data_path(id);
        for name in SYNC_STATE_FILES {
            let file = dir.join(name);
            if file.exists() {
                fs::remove_file(&file).with_path(&file)?;
            }
        }
        debug!("cleared sync state for job '{}'", id);
        Ok(())
    }

    /// Remove a job's entire data directory, root included
    ///
    /// Invoked only on job deletion; not interchangeable with
    /// [`clear_data`](Self::clear_data).
    pub fn purge_data(&self, id: &str) -> Result<()> {
        self.clear_data(id)?;
        let dir = self.job_data_path(id);
        if dir.exists() {
            fs::remove_dir_all(&dir).with_path(&dir)?;
        }
        info!("purged data directory for job '{}'", id);
        Ok(())
    }

    /// Rewrite the full document
    ///
    /// Writes a sibling temp file then renames it over the document, so a
    /// concurrent reader sees either the old or the new version in full. On
    /// failure the in-memory state is kept for retry.
    pub fn save(&mut self) -> Result<()> {
        let jobs = self.ensure_loaded()?;
        let content = serde_json::to_string_pretty(&jobs)
            .map_err(|e| SyncHubError::persistence("configs.json", e.to_string()))?;

        if let Some(parent) = self.config_file.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        let tmp = self.config_file.with_extension("json.tmp");
        fs::write(&tmp, content).with_path(&tmp)?;
        fs::rename(&tmp, &self.config_file).with_path(&self.config_file)?;
        Ok(())
    }
}
