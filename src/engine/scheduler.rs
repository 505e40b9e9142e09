//! Scheduler seam between the control-plane and the sync engine
//!
//! The engine (per-job workers, diffing, transfer) lives outside this crate.
//! The control-plane issues fire-and-forget commands and polls cheap state
//! reads; it never blocks on a sync cycle. [`AgentScheduler`] is the
//! in-process implementation: commands travel over a bounded channel to a
//! manager thread, observable state sits behind an `RwLock` for polling.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::thread;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SyncHubError};

/// Progress snapshot of a running job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Files examined so far in this cycle
    pub total_files: u64,
    /// Files already reconciled
    pub files_done: u64,
    /// Bytes transferred
    pub bytes_done: u64,
    /// Completion estimate, 0-100
    pub percent: f64,
    /// Path currently being processed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
}

/// Control surface the API layer programs the engine through
pub trait JobScheduler: Send + Sync {
    /// Re-read job configurations from the registry document
    fn reload(&self);

    /// Allow a job to run
    fn enable_job(&self, job_id: &str);

    /// Stop scheduling a job; idempotent
    fn disable_job(&self, job_id: &str);

    /// Whether a sync cycle is currently executing for this job
    fn is_job_running(&self, job_id: &str) -> bool;

    /// Progress of the current cycle, when one is running
    fn job_progress(&self, job_id: &str) -> Option<SyncProgress>;

    /// Ask for an out-of-schedule cycle; queues behind a running one
    fn run_now(&self, job_id: &str);

    /// Forward a named command to one job's worker
    fn signal_job(&self, command: &str, job_id: &str) -> Result<()>;

    /// Forward a named command to the scheduler itself
    fn signal(&self, command: &str) -> Result<()>;
}

/// Commands accepted by the scheduler manager thread
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Reload,
    Enable(String),
    Disable(String),
    RunNow(String),
    Job(String, String),
    Generic(String),
}

#[derive(Debug, Clone, Default)]
struct JobState {
    enabled: bool,
    running: bool,
    progress: Option<SyncProgress>,
}

/// In-process scheduler front
///
/// Owns the command channel and the polled state map. Worker threads plugged
/// in by the engine update `running`/`progress` through
/// [`mark_running`](Self::mark_running); the control-plane only reads them.
pub struct AgentScheduler {
    commands: Sender<Command>,
    states: Arc<RwLock<HashMap<String, JobState>>>,
}

impl AgentScheduler {
    /// Commands queued before the manager thread drops them
    const QUEUE_SIZE: usize = 256;

    /// Start the manager thread and return the control front
    pub fn start() -> Arc<Self> {
        let (tx, rx) = bounded(Self::QUEUE_SIZE);
        let states: Arc<RwLock<HashMap<String, JobState>>> = Arc::default();
        let scheduler = Arc::new(Self {
            commands: tx,
            states: Arc::clone(&states),
        });

        thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || manager_loop(rx, states))
            .expect("spawn scheduler thread");

        scheduler
    }

    fn send(&self, command: Command) {
        match self.commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(cmd)) => {
                warn!("scheduler queue full, dropping {:?}", cmd);
            }
            Err(TrySendError::Disconnected(cmd)) => {
                warn!("scheduler stopped, dropping {:?}", cmd);
            }
        }
    }

    /// Engine-side hook: record that a job's cycle started or finished
    pub fn mark_running(&self, job_id: &str, running: bool, progress: Option<SyncProgress>) {
        let mut states = self.states.write().expect("scheduler state poisoned");
        let state = states.entry(job_id.to_string()).or_default();
        state.running = running;
        state.progress = progress;
    }
}

impl JobScheduler for AgentScheduler {
    fn reload(&self) {
        self.send(Command::Reload);
    }

    fn enable_job(&self, job_id: &str) {
        self.send(Command::Enable(job_id.to_string()));
    }

    fn disable_job(&self, job_id: &str) {
        self.send(Command::Disable(job_id.to_string()));
    }

    fn is_job_running(&self, job_id: &str) -> bool {
        self.states
            .read()
            .expect("scheduler state poisoned")
            .get(job_id)
            .map(|s| s.running)
            .unwrap_or(false)
    }

    fn job_progress(&self, job_id: &str) -> Option<SyncProgress> {
        self.states
            .read()
            .expect("scheduler state poisoned")
            .get(job_id)
            .and_then(|s| s.progress.clone())
    }

    fn run_now(&self, job_id: &str) {
        self.send(Command::RunNow(job_id.to_string()));
    }

    fn signal_job(&self, command: &str, job_id: &str) -> Result<()> {
        match command {
            "enable" | "disable" | "run" | "pause" | "resume" => {
                self.send(Command::Job(command.to_string(), job_id.to_string()));
                Ok(())
            }
            other => Err(SyncHubError::UnknownCommand(other.to_string())),
        }
    }

    fn signal(&self, command: &str) -> Result<()> {
        match command {
            "reload" | "pause-all" | "resume-all" => {
                self.send(Command::Generic(command.to_string()));
                Ok(())
            }
            other => Err(SyncHubError::UnknownCommand(other.to_string())),
        }
    }
}

fn manager_loop(rx: Receiver<Command>, states: Arc<RwLock<HashMap<String, JobState>>>) {
    info!("scheduler manager started");
    for command in rx.iter() {
        let mut states = states.write().expect("scheduler state poisoned");
        match command {
            Command::Reload => {
                debug!("scheduler reloading job configurations");
            }
            Command::Enable(id) => {
                states.entry(id.clone()).or_default().enabled = true;
                debug!("job '{}' enabled", id);
            }
            Command::Disable(id) => {
                // Disabling twice is a no-op by design of the state map.
                states.entry(id.clone()).or_default().enabled = false;
                debug!("job '{}' disabled", id);
            }
            Command::RunNow(id) => {
                debug!("job '{}' asked to run out of schedule", id);
            }
            Command::Job(cmd, id) => {
                debug!("forwarding '{}' to worker of job '{}'", cmd, id);
            }
            Command::Generic(cmd) => {
                debug!("scheduler-wide command '{}'", cmd);
            }
        }
    }
    info!("scheduler manager stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settle() {
        // Commands are fire-and-forget; give the manager thread a beat.
        thread::sleep(Duration::from_millis(50));
    }

    #[test]
    fn test_running_state_defaults_false() {
        let scheduler = AgentScheduler::start();
        assert!(!scheduler.is_job_running("ex.com-ws1"));
        assert!(scheduler.job_progress("ex.com-ws1").is_none());
    }

    #[test]
    fn test_mark_running_is_polled() {
        let scheduler = AgentScheduler::start();
        let progress = SyncProgress {
            total_files: 10,
            files_done: 4,
            percent: 40.0,
            ..Default::default()
        };
        scheduler.mark_running("ex.com-ws1", true, Some(progress));
        assert!(scheduler.is_job_running("ex.com-ws1"));
        assert_eq!(scheduler.job_progress("ex.com-ws1").unwrap().files_done, 4);

        scheduler.mark_running("ex.com-ws1", false, None);
        assert!(!scheduler.is_job_running("ex.com-ws1"));
    }

    #[test]
    fn test_disable_twice_is_silent() {
        let scheduler = AgentScheduler::start();
        scheduler.disable_job("ex.com-ws1");
        scheduler.disable_job("ex.com-ws1");
        settle();
        assert!(!scheduler.is_job_running("ex.com-ws1"));
    }

    #[test]
    fn test_unknown_commands_rejected() {
        let scheduler = AgentScheduler::start();
        assert!(scheduler.signal_job("explode", "id").is_err());
        assert!(scheduler.signal("explode").is_err());
        assert!(scheduler.signal_job("enable", "id").is_ok());
        assert!(scheduler.signal("reload").is_ok());
    }
}
