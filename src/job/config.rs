//! Job configuration and identity generation
//!
//! A [`JobConfig`] describes one directory↔workspace synchronization
//! relationship. Descriptors arriving over the API or from disk decode into
//! the typed [`JobDescriptor`] first, get validated, then become a
//! `JobConfig` with all defaulting and derivation rules applied.

use std::path::PathBuf;

use globset::Glob;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SyncHubError};

/// Synchronization direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Local changes pushed to the server only
    Up,
    /// Remote changes pulled locally only
    Down,
    /// Both directions
    #[default]
    Bi,
}

/// How often a job wakes up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncFrequency {
    /// Continuous: react to filesystem/remote events
    #[default]
    Auto,
    /// Only when explicitly triggered
    Manual,
    /// Once a day at `start_time`
    Time,
}

/// Conflict resolution policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Surface conflicts for a user decision
    #[default]
    Manual,
    /// Remote copy wins
    Remote,
    /// Local copy wins
    Local,
    /// Keep both copies
    Both,
}

/// Daily start time, meaningful only when frequency is `time`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StartTime {
    /// Hour, 0-23
    pub h: u8,
    /// Minute, 0-59
    pub m: u8,
}

/// Include/exclude glob filters applied to synchronized paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFilters {
    /// Paths to synchronize
    #[serde(default = "default_includes")]
    pub includes: Vec<String>,
    /// Paths to skip
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,
}

fn default_includes() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_excludes() -> Vec<String> {
    [".*", "*/.*", "/recycle_bin*", "*.partial", "*.DS_Store", ".~lock.*"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for SyncFilters {
    fn default() -> Self {
        Self {
            includes: default_includes(),
            excludes: default_excludes(),
        }
    }
}

impl SyncFilters {
    /// Reject filters containing invalid glob patterns
    pub fn validate(&self) -> Result<()> {
        for pattern in self.includes.iter().chain(self.excludes.iter()) {
            Glob::new(pattern)
                .map_err(|e| SyncHubError::validation(format!("bad filter '{}': {}", pattern, e)))?;
        }
        Ok(())
    }
}

/// One configured synchronization job
///
/// `monitor` is always derived from `frequency` and never serialized; the
/// persisted document and the API projection both omit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Permanent identity, assigned once via [`make_id`]
    pub id: String,
    /// Server base URL
    pub server: String,
    /// Remote workspace id or alias
    pub workspace: String,
    /// Sub-path inside the workspace, empty for the workspace root
    #[serde(default)]
    pub remote_folder: String,
    /// Local root directory, trailing separators stripped
    pub directory: PathBuf,
    /// Remote account name
    #[serde(rename = "user", default)]
    pub user_id: String,
    /// Display label, defaults to the id
    #[serde(default)]
    pub label: String,
    /// Synchronization direction
    #[serde(default)]
    pub direction: SyncDirection,
    /// Wake-up policy
    #[serde(default)]
    pub frequency: SyncFrequency,
    /// Daily start time for `time` frequency
    #[serde(default)]
    pub start_time: StartTime,
    /// Conflict policy
    #[serde(default)]
    pub solve: ConflictPolicy,
    /// Accept self-signed certificates from this server
    #[serde(default)]
    pub trust_ssl: bool,
    /// Whether the scheduler may run this job
    #[serde(default = "default_active")]
    pub active: bool,
    /// Path filters
    #[serde(default)]
    pub filters: SyncFilters,
    /// Derived: true iff the job watches for changes (`auto` or `time`)
    #[serde(skip)]
    pub monitor: bool,
}

fn default_active() -> bool {
    true
}

impl JobConfig {
    /// Apply derivation rules after any decode: normalize paths, default the
    /// label, and derive `monitor` from `frequency`.
    pub fn normalize(&mut self) {
        self.directory = strip_trailing_separators(&self.directory);
        self.remote_folder = self
            .remote_folder
            .trim_end_matches(['/', '\\'])
            .to_string();
        if self.label.is_empty() {
            self.label = self.id.clone();
        }
        self.monitor = matches!(self.frequency, SyncFrequency::Auto | SyncFrequency::Time);
    }
}

fn strip_trailing_separators(path: &std::path::Path) -> PathBuf {
    let text = path.to_string_lossy();
    PathBuf::from(text.trim_end_matches(['/', '\\']))
}

/// Typed job descriptor as accepted on the API boundary
///
/// Unknown keys are tolerated; every optional field has a documented default
/// applied when it becomes a [`JobConfig`]. The three marker fields never
/// reach the registry: `test_path` and `compute_sizes` request ephemeral
/// pre-checks, `toggle_status` marks a cheap enable/disable flip that must
/// not clear sync state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobDescriptor {
    /// Existing id for updates; absent on first registration
    #[serde(default)]
    pub id: Option<String>,
    /// Server base URL
    #[serde(default)]
    pub server: String,
    /// Remote workspace
    #[serde(default)]
    pub workspace: String,
    /// Sub-path inside the workspace
    #[serde(default)]
    pub remote_folder: Option<String>,
    /// Local root directory
    #[serde(default)]
    pub directory: String,
    /// Remote account name
    #[serde(rename = "user", default)]
    pub user_id: String,
    /// Display label
    #[serde(default)]
    pub label: Option<String>,
    /// Secret; routed to the credential store, never persisted
    #[serde(default)]
    pub password: Option<String>,
    /// Synchronization direction
    #[serde(default)]
    pub direction: Option<SyncDirection>,
    /// Wake-up policy
    #[serde(default)]
    pub frequency: Option<SyncFrequency>,
    /// Daily start time
    #[serde(default)]
    pub start_time: Option<StartTime>,
    /// Conflict policy
    #[serde(default)]
    pub solve: Option<ConflictPolicy>,
    /// Accept self-signed certificates
    #[serde(default)]
    pub trust_ssl: Option<bool>,
    /// Whether the scheduler may run this job
    #[serde(default)]
    pub active: Option<bool>,
    /// Path filters
    #[serde(default)]
    pub filters: Option<SyncFilters>,
    /// Pre-check marker: suggest a local directory without mutating anything
    #[serde(default)]
    pub test_path: bool,
    /// Pre-check marker: estimate transfer volume without mutating anything
    #[serde(default)]
    pub compute_sizes: bool,
    /// Marker: pure status flip, skip the sync-state clear on update
    #[serde(default)]
    pub toggle_status: bool,
}

impl JobDescriptor {
    /// Validate the descriptor and build the job it describes
    ///
    /// `contains` answers id-membership queries against the current registry
    /// state for collision-free id generation. The extracted password, when
    /// present, is returned separately for the credential store.
    pub fn into_config(
        self,
        mut contains: impl FnMut(&str) -> bool,
    ) -> Result<(JobConfig, Option<String>)> {
        if self.server.is_empty() {
            return Err(SyncHubError::validation("missing server URL"));
        }
        if self.workspace.is_empty() {
            return Err(SyncHubError::validation("missing workspace"));
        }
        if self.directory.is_empty() {
            return Err(SyncHubError::validation("missing local directory"));
        }

        let id = match self.id {
            Some(id) if !id.is_empty() => id,
            _ => make_id(&self.server, &self.workspace, &mut contains)?,
        };

        let filters = self.filters.unwrap_or_default();
        filters.validate()?;

        let mut job = JobConfig {
            id,
            server: self.server,
            workspace: self.workspace,
            remote_folder: self.remote_folder.unwrap_or_default(),
            directory: PathBuf::from(self.directory),
            user_id: self.user_id,
            label: self.label.unwrap_or_default(),
            direction: self.direction.unwrap_or_default(),
            frequency: self.frequency.unwrap_or_default(),
            start_time: self.start_time.unwrap_or_default(),
            solve: self.solve.unwrap_or_default(),
            trust_ssl: self.trust_ssl.unwrap_or(false),
            active: self.active.unwrap_or(true),
            filters,
            monitor: false,
        };
        job.normalize();
        Ok((job, self.password))
    }
}

/// Derive a job id from its server and workspace
///
/// Base form is `lowercase(host) + "-" + workspace`; on collision a numeric
/// suffix `-1`, `-2`, … probes until a free id is found. Deterministic for a
/// fixed registry state. The id is permanent: later server/workspace edits
/// never rename an existing job.
pub fn make_id(
    server: &str,
    workspace: &str,
    mut contains: impl FnMut(&str) -> bool,
) -> Result<String> {
    let url = Url::parse(server)
        .map_err(|e| SyncHubError::validation(format!("bad server URL '{}': {}", server, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| SyncHubError::validation(format!("server URL '{}' has no host", server)))?
        .to_lowercase();

    let base = format!("{}-{}", host, workspace);
    if !contains(&base) {
        return Ok(base);
    }
    let mut suffix = 1u32;
    loop {
        let candidate = format!("{}-{}", base, suffix);
        if !contains(&candidate) {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn descriptor(doc: &str) -> JobDescriptor {
        serde_json::from_str(doc).unwrap()
    }

    #[test]
    fn test_make_id_no_collision() {
        let taken: HashSet<String> = HashSet::new();
        let id = make_id("https://ex.com", "ws1", &|id: &str| taken.contains(id)).unwrap();
        assert_eq!(id, "ex.com-ws1");
    }

    #[test]
    fn test_make_id_probes_suffixes() {
        let taken: HashSet<String> =
            ["ex.com-ws1", "ex.com-ws1-1"].iter().map(|s| s.to_string()).collect();
        let id = make_id("https://EX.com", "ws1", &|id: &str| taken.contains(id)).unwrap();
        assert_eq!(id, "ex.com-ws1-2");
    }

    #[test]
    fn test_make_id_rejects_bad_url() {
        assert!(make_id("not a url", "ws1", &|_: &str| false).is_err());
    }

    proptest! {
        #[test]
        fn prop_make_id_avoids_any_taken_set(n in 0usize..20) {
            let base = "ex.com-ws1".to_string();
            let mut taken: HashSet<String> = HashSet::new();
            taken.insert(base.clone());
            for i in 1..=n {
                taken.insert(format!("{}-{}", base, i));
            }
            let id = make_id("https://ex.com", "ws1", &|id: &str| taken.contains(id)).unwrap();
            prop_assert!(!taken.contains(&id));
            // Deterministic: same registry state, same answer.
            let again = make_id("https://ex.com", "ws1", &|id: &str| taken.contains(id)).unwrap();
            prop_assert_eq!(id, again);
        }
    }

    #[test]
    fn test_descriptor_defaults() {
        let desc = descriptor(
            r#"{"server": "https://ex.com", "workspace": "ws1", "directory": "/tmp/d/", "unknown_key": 42}"#,
        );
        let (job, password) = desc.into_config(|_| false).unwrap();
        assert_eq!(job.id, "ex.com-ws1");
        assert_eq!(job.directory, PathBuf::from("/tmp/d"));
        assert_eq!(job.label, "ex.com-ws1");
        assert_eq!(job.direction, SyncDirection::Bi);
        assert_eq!(job.frequency, SyncFrequency::Auto);
        assert_eq!(job.solve, ConflictPolicy::Manual);
        assert!(job.active);
        assert!(job.monitor);
        assert!(password.is_none());
        assert_eq!(job.filters.includes, vec!["*".to_string()]);
    }

    #[test]
    fn test_descriptor_extracts_password() {
        let desc = descriptor(
            r#"{"server": "https://ex.com", "workspace": "ws1", "directory": "/d",
                "user": "alice", "password": "hunter2"}"#,
        );
        let (job, password) = desc.into_config(|_| false).unwrap();
        assert_eq!(job.user_id, "alice");
        assert_eq!(password.as_deref(), Some("hunter2"));
        // The secret never reaches the serialized job form.
        let encoded = serde_json::to_string(&job).unwrap();
        assert!(!encoded.contains("hunter2"));
        assert!(!encoded.contains("password"));
    }

    #[test]
    fn test_descriptor_rejects_invalid_enum() {
        let err = serde_json::from_str::<JobDescriptor>(
            r#"{"server": "https://ex.com", "workspace": "w", "directory": "/d", "direction": "sideways"}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_descriptor_rejects_missing_fields() {
        let desc = descriptor(r#"{"workspace": "ws1", "directory": "/d"}"#);
        assert!(desc.into_config(|_| false).is_err());
    }

    #[test]
    fn test_descriptor_rejects_bad_filter_glob() {
        let desc = descriptor(
            r#"{"server": "https://ex.com", "workspace": "w", "directory": "/d",
                "filters": {"includes": ["[unclosed"], "excludes": []}}"#,
        );
        assert!(desc.into_config(|_| false).is_err());
    }

    #[test]
    fn test_monitor_derivation() {
        for (frequency, expected) in [("auto", true), ("time", true), ("manual", false)] {
            let desc = descriptor(&format!(
                r#"{{"server": "https://ex.com", "workspace": "w", "directory": "/d", "frequency": "{}"}}"#,
                frequency
            ));
            let (job, _) = desc.into_config(|_| false).unwrap();
            assert_eq!(job.monitor, expected, "frequency={}", frequency);
        }
    }

    #[test]
    fn test_monitor_not_settable_from_input() {
        let desc = descriptor(
            r#"{"server": "https://ex.com", "workspace": "w", "directory": "/d",
                "frequency": "manual", "monitor": true}"#,
        );
        let (job, _) = desc.into_config(|_| false).unwrap();
        assert!(!job.monitor);
    }

    #[test]
    fn test_existing_id_is_kept() {
        let desc = descriptor(
            r#"{"id": "old.host-ws", "server": "https://new.host", "workspace": "ws2", "directory": "/d"}"#,
        );
        let (job, _) = desc.into_config(|_| false).unwrap();
        assert_eq!(job.id, "old.host-ws");
    }
}
