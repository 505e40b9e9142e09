//! Wire models for the remote discovery endpoints
//!
//! The remote server renders XML resources as JSON: element attributes become
//! `"@name"` keys and a single child element arrives as an object where a list
//! is otherwise expected. Decoding here tolerates both shapes.

use serde::de::{Deserialize, Deserializer};
use serde::Serialize;

/// One remote workspace entry from the repositories listing
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct Workspace {
    /// Workspace identifier or alias
    #[serde(rename = "@id")]
    pub id: String,
    /// Human-readable label
    #[serde(default)]
    pub label: String,
    /// Access driver; internal/administrative entries carry a reserved prefix
    #[serde(rename = "@access_type", default)]
    pub access_type: String,
}

impl Workspace {
    /// Internal workspaces are never offered for synchronization
    pub fn is_internal(&self) -> bool {
        self.access_type.starts_with("internal")
    }
}

/// Envelope of the repositories listing
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RepositoryEnvelope {
    /// Wrapper object around the repo list
    pub repositories: RepositoryList,
}

/// The repo list itself, tolerant of the one-element-as-object shape
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RepositoryList {
    /// Workspace entries
    #[serde(default, deserialize_with = "one_or_many")]
    pub repo: Vec<Workspace>,
}

/// Workspace listing returned to the front-end, with best-effort enrichment
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceListing {
    /// Synchronizable workspaces (internal entries already dropped)
    pub repositories: Vec<Workspace>,
    /// Remote application name, when the server exposes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_title: Option<String>,
    /// Display name of the authenticated user, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_display_name: Option<String>,
}

/// A folder node in the remote workspace tree
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct FolderNode {
    /// Full path of the folder inside the workspace
    #[serde(rename = "@filename", default)]
    pub filename: String,
    /// Display name
    #[serde(rename = "@text", default)]
    pub text: String,
    /// Child folders
    #[serde(default, deserialize_with = "one_or_many")]
    pub tree: Vec<FolderNode>,
}

/// Envelope of the folder tree listing
#[derive(Debug, Clone, serde::Deserialize)]
pub struct FolderTreeEnvelope {
    /// Root node; its children are the workspace's top-level folders
    pub tree: FolderTreeRoot,
}

/// Root of the folder tree
#[derive(Debug, Clone, serde::Deserialize)]
pub struct FolderTreeRoot {
    /// Error message when the workspace could not be loaded
    #[serde(default)]
    pub message: Option<String>,
    /// Top-level folders
    #[serde(default, deserialize_with = "one_or_many")]
    pub tree: Vec<FolderNode>,
}

/// One entry of the change feed used for remote size estimation
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChangeEntry {
    /// Node the change applies to
    #[serde(default)]
    pub node: Option<ChangeNode>,
}

/// Node payload of a change entry
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChangeNode {
    /// Size in bytes; directories report zero
    #[serde(default)]
    pub bytesize: u64,
    /// Content hash, or the literal "directory" for folders
    #[serde(default)]
    pub md5: String,
}

/// Envelope of the change feed
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChangeFeed {
    /// Changes since the requested sequence number
    #[serde(default, deserialize_with = "one_or_many")]
    pub changes: Vec<ChangeEntry>,
}

impl ChangeFeed {
    /// Total content bytes across non-directory changes
    pub fn content_bytes(&self) -> u64 {
        self.changes
            .iter()
            .filter_map(|c| c.node.as_ref())
            .filter(|n| n.md5 != "directory")
            .map(|n| n.bytesize)
            .sum()
    }
}

/// Accept either a JSON array or a single object where a list is expected
fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match OneOrMany::<T>::deserialize(deserializer)? {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    })
}
