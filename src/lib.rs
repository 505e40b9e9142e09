//! # SyncHub - Control-Plane for a File-Synchronization Agent
//!
//! SyncHub is the local control-plane of a file-synchronization agent: it
//! persists synchronization job definitions, exposes a digest-protected
//! local management API for a companion front-end, and bridges between a
//! remote file-sharing server's REST API and the synchronization engine.
//!
//! ## Features
//!
//! - **Job Registry**: durable job configurations in one JSON document,
//!   with derived identities and per-job data-directory lifecycle
//! - **Control-Plane API**: create/inspect/enable/disable/delete jobs over
//!   a local HTTP surface
//! - **Digest Authentication**: SHA-256 challenge/response in front of
//!   every operation
//! - **Remote Discovery Proxy**: workspace and folder listings with a
//!   stable error taxonomy, never a raw transport error
//! - **Engine Seams**: scheduler, event-log and conflict handlers as traits
//!   the sync engine plugs into
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use synchub::api::{AppState, ControlApiConfig, ControlApiServer, DigestAuthGate};
//! use synchub::engine::AgentScheduler;
//! use synchub::job::JobRegistry;
//! use synchub::remote::RemoteClient;
//! use synchub::secrets::MemoryCredentialStore;
//!
//! let mut registry = JobRegistry::new("/var/lib/synchub");
//! registry.load().unwrap();
//!
//! let state = Arc::new(AppState::new(
//!     registry,
//!     Arc::new(MemoryCredentialStore::new()),
//!     AgentScheduler::start(),
//!     RemoteClient::default(),
//!     "/home/me/SyncHub".into(),
//! ));
//!
//! let auth = Arc::new(DigestAuthGate::new("SyncHubAuthRealm"));
//! auth.add_user("admin", "s3cret");
//!
//! let server = ControlApiServer::new(ControlApiConfig::default(), state, auth);
//! server.run().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod job;
pub mod remote;
pub mod secrets;

// Re-export commonly used types
pub use error::{Result, SyncHubError};
pub use job::{JobConfig, JobRegistry};
pub use remote::{RemoteClient, RemoteError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use synchub::prelude::*;
    //! ```

    pub use crate::api::{AppState, ControlApiConfig, ControlApiServer, DigestAuthGate};
    pub use crate::engine::{AgentScheduler, ConflictHandler, EventLogger, JobScheduler};
    pub use crate::error::{Result, SyncHubError};
    pub use crate::job::{JobConfig, JobDescriptor, JobRegistry};
    pub use crate::remote::{DiscoveryTarget, RemoteClient, RemoteError};
    pub use crate::secrets::{CredentialStore, MemoryCredentialStore};
}
