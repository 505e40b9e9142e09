//! SyncHub agent binary
//!
//! Bootstraps the control-plane: registry and credential store from CLI
//! arguments, then the scheduler and the digest-protected API server.

use std::fs;
use std::sync::Arc;

use clap::Parser;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use synchub::api::{AppState, ControlApiConfig, ControlApiServer, DigestAuthGate};
use synchub::config::{AgentConfig, CliArgs};
use synchub::diagnostics::run_diagnostics;
use synchub::engine::{AgentScheduler, JobScheduler};
use synchub::error::{IoResultExt, Result, SyncHubError};
use synchub::job::{JobConfig, JobDescriptor, JobRegistry, SyncDirection};
use synchub::remote::RemoteClient;
use synchub::secrets::{CredentialStore, MemoryCredentialStore};

/// Where a local front-end picks up the generated API credentials
const API_ACCESS_FILE: &str = "api_access.json";

fn main() {
    let args = CliArgs::parse();

    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(args) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<()> {
    let config = AgentConfig::from_cli(&args)?;
    fs::create_dir_all(&config.data_path).with_path(&config.data_path)?;

    let mut registry = match &config.jobs_file {
        Some(file) => JobRegistry::with_config_file(&config.data_path, file),
        None => JobRegistry::new(&config.data_path),
    };
    registry.load()?;

    let credentials: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
    if let Some(tool) = &config.diff_tool {
        info!("external diff tool: {}", tool.display());
    }

    if args.server.is_some() && args.directory.is_some() && args.workspace.is_some() {
        let job = register_job_from_args(&args, &mut registry, &credentials)?;
        info!("registered job '{}' from command line", job.id);
    }

    if args.diag {
        let first = {
            let jobs = registry.get_all()?;
            let mut ids: Vec<&String> = jobs.keys().collect();
            ids.sort();
            ids.first().map(|id| jobs[*id].clone())
        };
        let code = run_diagnostics(first.as_ref(), &credentials, &RemoteClient::default());
        std::process::exit(code);
    }

    let (api_user, api_password) = api_credentials(&args);
    write_api_access(&config, &api_user, &api_password)?;

    let auth = Arc::new(DigestAuthGate::new("SyncHubAuthRealm"));
    auth.add_user(&api_user, &api_password);

    let scheduler = AgentScheduler::start();
    scheduler.reload();

    let state = Arc::new(AppState::new(
        registry,
        credentials,
        scheduler,
        RemoteClient::default(),
        config.default_parent.clone(),
    ));

    let server = ControlApiServer::new(
        ControlApiConfig {
            bind: config.api_address.clone(),
            port: config.api_port,
            ..Default::default()
        },
        state,
        auth,
    );
    server.run()
}

/// Build and persist a job described on the command line
fn register_job_from_args(
    args: &CliArgs,
    registry: &mut JobRegistry,
    credentials: &Arc<dyn CredentialStore>,
) -> Result<JobConfig> {
    let direction = match args.direction.as_str() {
        "up" => SyncDirection::Up,
        "down" => SyncDirection::Down,
        "bi" => SyncDirection::Bi,
        other => {
            return Err(SyncHubError::validation(format!(
                "bad direction '{}', expected up, down or bi",
                other
            )))
        }
    };
    let descriptor = JobDescriptor {
        server: args.server.clone().unwrap_or_default(),
        workspace: args.workspace.clone().unwrap_or_default(),
        directory: args.directory.clone().unwrap_or_default(),
        remote_folder: args.remote_folder.clone(),
        user_id: args.user.clone().unwrap_or_default(),
        password: args.password.clone(),
        direction: Some(direction),
        ..Default::default()
    };
    let (job, password) = descriptor.into_config(|id| registry.contains(id))?;
    if let Some(password) = password {
        credentials.set(&job.server, &job.user_id, &password);
    }
    registry.upsert(job.clone())?;
    Ok(job)
}

fn api_credentials(args: &CliArgs) -> (String, String) {
    let random = |len: usize| -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    };
    (
        args.api_user.clone().unwrap_or_else(|| random(12)),
        args.api_password.clone().unwrap_or_else(|| random(24)),
    )
}

#[derive(Serialize)]
struct ApiAccess<'a> {
    port: u16,
    user: &'a str,
    password: &'a str,
}

/// Persist the API credentials where the local front-end expects them
fn write_api_access(config: &AgentConfig, user: &str, password: &str) -> Result<()> {
    let access = ApiAccess {
        port: config.api_port,
        user,
        password,
    };
    let path = config.data_path.join(API_ACCESS_FILE);
    let body = serde_json::to_string_pretty(&access)
        .map_err(|e| SyncHubError::persistence(&path, e.to_string()))?;
    fs::write(&path, body).with_path(&path)?;
    info!("API access details written to {}", path.display());
    Ok(())
}
