//! Credential storage
//!
//! Process-wide secret storage keyed by `(server, user)`. Job configurations
//! and the persisted registry document never carry credentials; everything
//! secret lives here, behind a trait so front-ends and tests can substitute
//! their own backend (OS keychain, encrypted file, …).

use std::collections::HashMap;
use std::sync::RwLock;

/// Storage backend for remote-account credentials
///
/// Access is synchronous and bounded to a local round-trip; implementations
/// must never block on the network.
pub trait CredentialStore: Send + Sync {
    /// Store or replace the secret for `(server, user)`
    fn set(&self, server: &str, user: &str, secret: &str);

    /// Fetch the secret for `(server, user)`
    fn get(&self, server: &str, user: &str) -> Option<String>;

    /// Drop the secret for `(server, user)` if present
    fn delete(&self, server: &str, user: &str);
}

/// In-process credential store
///
/// Seeded at bootstrap from CLI arguments or front-end requests; contents
/// die with the process.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<(String, String), String>>,
}

impl MemoryCredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn set(&self, server: &str, user: &str, secret: &str) {
        self.entries
            .write()
            .expect("credential store poisoned")
            .insert((server.to_string(), user.to_string()), secret.to_string());
    }

    fn get(&self, server: &str, user: &str) -> Option<String> {
        self.entries
            .read()
            .expect("credential store poisoned")
            .get(&(server.to_string(), user.to_string()))
            .cloned()
    }

    fn delete(&self, server: &str, user: &str) {
        self.entries
            .write()
            .expect("credential store poisoned")
            .remove(&(server.to_string(), user.to_string()));
    }
}

impl std::fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.entries.read().map(|e| e.len()).unwrap_or(0);
        f.debug_struct("MemoryCredentialStore")
            .field("entries", &format!("[{} REDACTED]", count))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let store = MemoryCredentialStore::new();
        assert!(store.get("https://ex.com", "alice").is_none());

        store.set("https://ex.com", "alice", "hunter2");
        assert_eq!(store.get("https://ex.com", "alice").as_deref(), Some("hunter2"));
        // Keyed by the pair, not the server alone.
        assert!(store.get("https://ex.com", "bob").is_none());

        store.set("https://ex.com", "alice", "rotated");
        assert_eq!(store.get("https://ex.com", "alice").as_deref(), Some("rotated"));

        store.delete("https://ex.com", "alice");
        assert!(store.get("https://ex.com", "alice").is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let store = MemoryCredentialStore::new();
        store.set("https://ex.com", "alice", "hunter2");
        let debug = format!("{:?}", store);
        assert!(!debug.contains("hunter2"));
    }
}
