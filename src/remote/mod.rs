//! Remote server proxy
//!
//! Authenticated, bounded-timeout HTTP access to the remote file-sharing
//! server's discovery endpoints, with a stable error taxonomy. The
//! control-plane never exposes raw transport errors to its callers.

mod client;
mod error;
mod models;

pub use client::{DiscoveryTarget, Endpoint, RemoteClient};
pub use error::RemoteError;
pub use models::{
    ChangeEntry, ChangeFeed, ChangeNode, FolderNode, FolderTreeEnvelope, FolderTreeRoot,
    RepositoryEnvelope, RepositoryList, Workspace, WorkspaceListing,
};
