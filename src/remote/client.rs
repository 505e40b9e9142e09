//! Remote discovery proxy client
//!
//! Performs one blocking, authenticated HTTP call per invocation against the
//! remote server's discovery endpoints, under a bounded timeout. Transport
//! failures never escape raw: everything maps into [`RemoteError`].

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::remote::error::RemoteError;
use crate::remote::models::{
    ChangeFeed, FolderNode, FolderTreeEnvelope, RepositoryEnvelope, WorkspaceListing,
};

/// A resolved remote endpoint: base URL plus the credentials to present
#[derive(Clone)]
pub struct Endpoint {
    /// Server base URL, no trailing slash
    pub base: String,
    /// Remote account name
    pub user: String,
    /// Remote account secret
    pub password: String,
    /// Skip certificate verification for self-signed servers
    pub trust_ssl: bool,
}

impl Endpoint {
    /// Build an endpoint, stripping any trailing slash from the base URL
    pub fn new(base: &str, user: &str, password: &str, trust_ssl: bool) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
            trust_ssl,
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("base", &self.base)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("trust_ssl", &self.trust_ssl)
            .finish()
    }
}

/// Which remote a discovery call targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryTarget {
    /// A job already in the registry; credentials come from the store
    Registered {
        /// Job id
        id: String,
    },
    /// An ad-hoc probe with inline parameters, used before a job exists
    AdHoc {
        /// Server base URL
        url: String,
        /// Account name
        user: String,
        /// Inline secret; when absent the credential store is consulted
        password: Option<String>,
        /// Skip certificate verification
        trust_ssl: bool,
        /// Workspace to inspect, for folder listings
        workspace: Option<String>,
    },
}

/// Blocking HTTP client for the remote discovery endpoints
#[derive(Debug, Clone)]
pub struct RemoteClient {
    timeout: Duration,
}

impl Default for RemoteClient {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
        }
    }
}

impl RemoteClient {
    /// Create a client with a custom per-call deadline
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn http(&self, trust_ssl: bool) -> Result<reqwest::blocking::Client, RemoteError> {
        reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(trust_ssl)
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .build()
            .map_err(|e| RemoteError::from_transport(&e))
    }

    /// GET a discovery URL and return the raw body of a 2xx response
    fn fetch(&self, endpoint: &Endpoint, url: &str) -> Result<String, RemoteError> {
        debug!("remote GET {}", url);
        let response = self
            .http(endpoint.trust_ssl)?
            .get(url)
            .basic_auth(&endpoint.user, Some(&endpoint.password))
            .send()
            .map_err(|e| RemoteError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::from_http_status(status));
        }
        response
            .text()
            .map_err(|e| RemoteError::from_transport(&e))
    }

    fn fetch_json(&self, endpoint: &Endpoint, url: &str) -> Result<Value, RemoteError> {
        let body = self.fetch(endpoint, url)?;
        serde_json::from_str(&body).map_err(|_| RemoteError::MalformedPayload)
    }

    /// List the workspaces visible to the endpoint's account
    ///
    /// Internal/administrative entries are dropped; application title and
    /// user display name are added best-effort, and their absence never
    /// fails the call.
    pub fn list_workspaces(&self, endpoint: &Endpoint) -> Result<WorkspaceListing, RemoteError> {
        let url = format!(
            "{}/api/state/user/repositories?format=json",
            endpoint.base
        );
        let body = self.fetch(endpoint, &url)?;
        let envelope: RepositoryEnvelope =
            serde_json::from_str(&body).map_err(|_| RemoteError::MalformedPayload)?;

        let repositories = envelope
            .repositories
            .repo
            .into_iter()
            .filter(|ws| !ws.is_internal())
            .collect();

        Ok(WorkspaceListing {
            repositories,
            application_title: self.fetch_application_title(endpoint),
            user_display_name: self.fetch_display_name(endpoint),
        })
    }

    /// List the folder tree of a workspace
    ///
    /// Ad-hoc probes pass a depth bound to keep the probe cheap on large
    /// workspaces.
    pub fn folder_tree(
        &self,
        endpoint: &Endpoint,
        workspace: &str,
        max_depth: Option<u32>,
    ) -> Result<Vec<FolderNode>, RemoteError> {
        let mut url = format!(
            "{}/api/{}/ls/?options=d&recursive=true&format=json",
            endpoint.base, workspace
        );
        if let Some(depth) = max_depth {
            url.push_str(&format!("&max_depth={}", depth));
        }
        let body = self.fetch(endpoint, &url)?;
        let envelope: FolderTreeEnvelope =
            serde_json::from_str(&body).map_err(|_| RemoteError::MalformedPayload)?;

        if let Some(message) = envelope.tree.message {
            warn!("remote workspace listing refused: {}", message);
            return Err(RemoteError::MalformedPayload);
        }
        Ok(envelope.tree.tree)
    }

    /// Estimate the content size of a workspace from its change feed
    pub fn estimate_workspace_size(
        &self,
        endpoint: &Endpoint,
        workspace: &str,
    ) -> Result<u64, RemoteError> {
        let url = format!("{}/api/{}/changes/0?format=json", endpoint.base, workspace);
        let body = self.fetch(endpoint, &url)?;
        let feed: ChangeFeed =
            serde_json::from_str(&body).map_err(|_| RemoteError::MalformedPayload)?;
        Ok(feed.content_bytes())
    }

    fn fetch_application_title(&self, endpoint: &Endpoint) -> Option<String> {
        let url = format!("{}/api/state/plugins?format=json", endpoint.base);
        let value = self.fetch_json(endpoint, &url).ok()?;
        // Dig leniently: {"plugins": {"core": [{"@id": "core.application", "@label": ...}]}}
        let cores = value.get("plugins")?.get("core")?;
        let entries: Vec<&Value> = match cores {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        entries
            .iter()
            .find(|entry| entry.get("@id").and_then(Value::as_str) == Some("core.application"))
            .and_then(|entry| entry.get("@label"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn fetch_display_name(&self, endpoint: &Endpoint) -> Option<String> {
        let url = format!("{}/api/state/user/preferences?format=json", endpoint.base);
        let value = self.fetch_json(endpoint, &url).ok()?;
        let prefs = value.get("preferences")?.get("pref")?;
        let entries: Vec<&Value> = match prefs {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        entries
            .iter()
            .find(|entry| {
                entry.get("@name").and_then(Value::as_str) == Some("user_display_name")
            })
            .and_then(|entry| entry.get("@value"))
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one canned HTTP response on an ephemeral port
    fn one_shot_server(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            // One connection per enrichment/listing request in the test.
            for stream in listener.incoming().take(4) {
                let mut stream = stream.unwrap();
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_timeout_maps_to_taxonomy() {
        // Accept the connection but never answer.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(5));
            drop(stream);
        });

        let client = RemoteClient::with_timeout(Duration::from_millis(200));
        let endpoint = Endpoint::new(&format!("http://{}", addr), "alice", "secret", false);
        let err = client.list_workspaces(&endpoint).unwrap_err();
        assert_eq!(err, RemoteError::Timeout);
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_unauthorized_maps_to_401() {
        let base = one_shot_server(
            "HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let client = RemoteClient::with_timeout(Duration::from_secs(2));
        let endpoint = Endpoint::new(&base, "alice", "wrong", false);
        let err = client.list_workspaces(&endpoint).unwrap_err();
        assert_eq!(err, RemoteError::Unauthorized);
        assert_eq!(err.status(), 401);
    }

    #[test]
    fn test_malformed_success_body_maps_to_400() {
        let base = one_shot_server(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot-json!",
        );
        let client = RemoteClient::with_timeout(Duration::from_secs(2));
        let endpoint = Endpoint::new(&base, "alice", "secret", false);
        let err = client.list_workspaces(&endpoint).unwrap_err();
        assert_eq!(err, RemoteError::MalformedPayload);
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_connection_refused_maps_to_connection() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = RemoteClient::with_timeout(Duration::from_secs(2));
        let endpoint = Endpoint::new(&format!("http://127.0.0.1:{}", port), "a", "b", false);
        let err = client.list_workspaces(&endpoint).unwrap_err();
        assert!(matches!(
            err,
            RemoteError::Connection | RemoteError::Timeout
        ));
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_endpoint_debug_redacts_password() {
        let endpoint = Endpoint::new("https://ex.com", "alice", "hunter2", false);
        let debug = format!("{:?}", endpoint);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }
}
