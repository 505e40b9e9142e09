//! One-shot connectivity self-test
//!
//! `synchub --diag` resolves the first configured job, performs a workspace
//! discovery call against its server, and exits with a status code a wrapper
//! script can act on. No state is mutated.

use std::sync::Arc;

use tracing::{error, info};

use crate::job::JobConfig;
use crate::remote::{Endpoint, RemoteClient};
use crate::secrets::CredentialStore;

/// Exit code when no job is configured to test against
pub const DIAG_NO_JOB: i32 = 2;
/// Exit code when the server rejected or never answered the probe
pub const DIAG_REMOTE_FAILED: i32 = 3;

/// Probe the server of `job` and report the outcome as an exit code
pub fn run_diagnostics(
    job: Option<&JobConfig>,
    credentials: &Arc<dyn CredentialStore>,
    client: &RemoteClient,
) -> i32 {
    let Some(job) = job else {
        error!("diagnostics: no job configured; register one first");
        return DIAG_NO_JOB;
    };

    let password = credentials
        .get(&job.server, &job.user_id)
        .unwrap_or_default();
    let endpoint = Endpoint::new(&job.server, &job.user_id, &password, job.trust_ssl);

    info!(
        "diagnostics: probing {} as '{}' for workspace '{}'",
        job.server, job.user_id, job.workspace
    );
    match client.list_workspaces(&endpoint) {
        Ok(listing) => {
            let found = listing.repositories.iter().any(|ws| ws.id == job.workspace);
            info!(
                "diagnostics: server answered with {} workspace(s){}",
                listing.repositories.len(),
                if found { "" } else { " (configured workspace not among them)" }
            );
            0
        }
        Err(e) => {
            error!("diagnostics: {} (status {})", e, e.status());
            DIAG_REMOTE_FAILED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemoryCredentialStore;

    #[test]
    fn test_no_job_is_distinct_exit_code() {
        let credentials: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let code = run_diagnostics(None, &credentials, &RemoteClient::default());
        assert_eq!(code, DIAG_NO_JOB);
    }
}
