//! SyncHub control-plane API
//!
//! Local HTTP surface a companion front-end drives the agent through. Every
//! non-static endpoint sits behind the digest authentication gate.
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/jobs` | GET | List jobs with live enrichment |
//! | `/jobs/{id}` | GET | One job |
//! | `/jobs-status` | GET | Jobs plus connectivity flag and notifications |
//! | `/jobs` | POST | Create/update a job, or run a pre-check |
//! | `/jobs/{id}` | DELETE | Remove a job and purge its data |
//! | `/jobs/{id}/logs` | GET | Filtered/paged event log |
//! | `/jobs/{id}/conflicts` | GET/POST | List/resolve conflicts |
//! | `/cmd/{cmd}/{id}` | GET | Per-job command (`enable`, `disable`, …) |
//! | `/cmd/{cmd}` | GET | Scheduler-wide command |
//! | `/ws/{id}` | GET | Workspace discovery (id `request` = ad-hoc probe) |
//! | `/folders/{id}` | GET | Folder-tree discovery |

mod auth;
mod handlers;
mod models;
mod server;

pub use auth::{client_response, parse_challenge_nonce, DigestAuthGate};
pub use handlers::*;
pub use models::*;
pub use server::{ControlApiConfig, ControlApiServer};
