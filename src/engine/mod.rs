//! Seams to the synchronization engine
//!
//! The diff/transfer engine is an external collaborator: the control-plane
//! talks to it through the [`JobScheduler`] and [`ConflictHandler`] traits
//! and the per-job [`EventLogger`]. In-process defaults are provided so the
//! agent runs standalone; a full engine substitutes its own implementations.

mod conflicts;
mod events;
mod scheduler;

pub use conflicts::{ConflictHandler, ConflictNode, ConflictStatus, FileConflictStore};
pub use events::{EventLogger, Notification, SyncEvent};
pub use scheduler::{AgentScheduler, JobScheduler, SyncProgress};
