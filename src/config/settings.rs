//! Configuration settings for SyncHub
//!
//! Defines the bootstrap CLI arguments and the runtime agent settings
//! derived from them.

use clap::Parser;
use std::path::PathBuf;

use crate::error::{Result, SyncHubError};

/// SyncHub - local control-plane for a file-synchronization agent
#[derive(Parser, Debug, Clone)]
#[command(name = "synchub")]
#[command(author = "SyncHub Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Manage file-synchronization jobs through a local API")]
#[command(long_about = r#"
SyncHub keeps directories in sync with remote workspaces. It persists job
definitions, exposes a digest-protected local HTTP API for a companion
front-end, and proxies discovery calls to the remote server.

Examples:
  synchub                                        # start with saved jobs
  synchub -s https://ex.com -w ws1 -d ~/Files -u alice
  synchub --diag                                 # one-shot connectivity check
  synchub -f /path/jobs.json                     # alternate job document
"#)]
pub struct CliArgs {
    /// Server URL, with http(s) scheme
    #[arg(short = 's', long, value_name = "URL")]
    pub server: Option<String>,

    /// Local directory to synchronize
    #[arg(short = 'd', long, value_name = "PATH")]
    pub directory: Option<String>,

    /// Id or alias of the workspace to synchronize
    #[arg(short = 'w', long, value_name = "WS")]
    pub workspace: Option<String>,

    /// Path to an existing folder of the workspace to synchronize
    #[arg(short = 'r', long, value_name = "PATH")]
    pub remote_folder: Option<String>,

    /// Remote account name
    #[arg(short = 'u', long, value_name = "NAME")]
    pub user: Option<String>,

    /// Remote account password (stored only in the credential store)
    #[arg(short = 'p', long, value_name = "SECRET")]
    pub password: Option<String>,

    /// Synchronization direction
    #[arg(long, value_name = "up|down|bi", default_value = "bi")]
    pub direction: String,

    /// Path to an external diff/patch tool used by the engine
    #[arg(short = 'i', long, value_name = "PATH")]
    pub diff_tool: Option<PathBuf>,

    /// JSON document containing job configurations
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub jobs_file: Option<PathBuf>,

    /// Data directory (registry document and per-job state)
    #[arg(long, value_name = "PATH", env = "SYNCHUB_DATA")]
    pub data_path: Option<PathBuf>,

    /// Agent API username (random when omitted)
    #[arg(long, value_name = "NAME")]
    pub api_user: Option<String>,

    /// Agent API password (random when omitted)
    #[arg(long, value_name = "SECRET")]
    pub api_password: Option<String>,

    /// Agent bind address; by default only local access is allowed
    #[arg(long, value_name = "ADDR")]
    pub api_address: Option<String>,

    /// Agent port
    #[arg(long, default_value = "5556", value_name = "PORT")]
    pub api_port: u16,

    /// Run a one-shot connectivity self-test and exit
    #[arg(long)]
    pub diag: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Runtime agent settings derived from CLI arguments
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Directory holding the registry document and per-job data
    pub data_path: PathBuf,
    /// Alternate registry document, when `--file` was given
    pub jobs_file: Option<PathBuf>,
    /// Parent directory suggested for new job directories
    pub default_parent: PathBuf,
    /// External diff tool handed to the engine
    pub diff_tool: Option<PathBuf>,
    /// API bind address
    pub api_address: String,
    /// API port
    pub api_port: u16,
}

impl AgentConfig {
    /// Derive the runtime settings, resolving the default data directory
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let data_path = match &args.data_path {
            Some(path) => path.clone(),
            None => default_data_dir()?,
        };
        let default_parent = home_dir()
            .map(|home| home.join("SyncHub"))
            .unwrap_or_else(|| data_path.clone());
        Ok(Self {
            data_path,
            jobs_file: args.jobs_file.clone(),
            default_parent,
            diff_tool: args.diff_tool.clone(),
            api_address: args
                .api_address
                .clone()
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            api_port: args.api_port,
        })
    }
}

/// Platform data directory for the agent
fn default_data_dir() -> Result<PathBuf> {
    data_local_dir()
        .map(|dir| dir.join("synchub"))
        .ok_or_else(|| SyncHubError::config("cannot determine a data directory; pass --data-path"))
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

/// Directory helper for default paths
fn data_local_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support"))
    }

    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_DATA_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".local/share"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["synchub"]);
        assert_eq!(args.api_port, 5556);
        assert_eq!(args.direction, "bi");
        assert!(!args.diag);
        assert!(args.server.is_none());
    }

    #[test]
    fn test_job_from_flags() {
        let args = CliArgs::parse_from([
            "synchub",
            "-s",
            "https://ex.com",
            "-w",
            "ws1",
            "-d",
            "/tmp/files",
            "-u",
            "alice",
            "--direction",
            "up",
        ]);
        assert_eq!(args.server.as_deref(), Some("https://ex.com"));
        assert_eq!(args.workspace.as_deref(), Some("ws1"));
        assert_eq!(args.direction, "up");
    }

    #[test]
    fn test_agent_config_honours_data_path() {
        let args = CliArgs::parse_from(["synchub", "--data-path", "/tmp/synchub-data"]);
        let config = AgentConfig::from_cli(&args).unwrap();
        assert_eq!(config.data_path, PathBuf::from("/tmp/synchub-data"));
        assert_eq!(config.api_address, "127.0.0.1");
    }
}
