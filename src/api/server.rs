//! Control-plane HTTP server
//!
//! Lightweight HTTP server over std TCP sockets, no web framework. Every
//! non-static request passes the digest gate before its handler runs, so an
//! unauthenticated request can never cause a side effect. Remote discovery
//! routes are additionally wrapped so an unexpected failure degrades to a
//! logged 400 instead of taking the agent down.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info};

use crate::api::auth::DigestAuthGate;
use crate::api::handlers::*;
use crate::api::models::ApiError;
use crate::error::{Result, SyncHubError};
use crate::remote::DiscoveryTarget;

/// Control-plane server configuration
#[derive(Debug, Clone)]
pub struct ControlApiConfig {
    /// Bind address; the default loopback keeps the agent local-only
    pub bind: String,
    /// Port
    pub port: u16,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ControlApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5556,
            max_body_size: 1024 * 1024,
        }
    }
}

/// Control-plane HTTP server
pub struct ControlApiServer {
    config: ControlApiConfig,
    state: Arc<AppState>,
    auth: Arc<DigestAuthGate>,
    shutdown: Arc<AtomicBool>,
}

impl ControlApiServer {
    /// Assemble a server around shared state and a seeded auth gate
    pub fn new(config: ControlApiConfig, state: Arc<AppState>, auth: Arc<DigestAuthGate>) -> Self {
        Self {
            config,
            state,
            auth,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get shutdown flag for external control
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the server (blocking)
    pub fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.bind, self.config.port);
        let listener = TcpListener::bind(&addr)
            .map_err(|e| SyncHubError::config(format!("cannot bind {}: {}", addr, e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| SyncHubError::config(format!("cannot configure {}: {}", addr, e)))?;

        info!("control-plane API listening on http://{}", addr);
        if self.config.bind != "127.0.0.1" && self.config.bind != "localhost" {
            info!("warning: the agent API is reachable from other machines");
        }

        while !self.shutdown.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    let state = Arc::clone(&self.state);
                    let auth = Arc::clone(&self.auth);
                    let config = self.config.clone();

                    thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, &state, &auth, &config) {
                            debug!("connection error: {}", e);
                        }
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(std::time::Duration::from_millis(10));
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }

        info!("control-plane API shutting down");
        Ok(())
    }
}

/// Handle a single HTTP connection
fn handle_connection(
    mut stream: TcpStream,
    state: &AppState,
    auth: &DigestAuthGate,
    config: &ControlApiConfig,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    let parts: Vec<&str> = request_line.trim().split_whitespace().collect();
    if parts.len() < 2 {
        return send_error(&mut stream, 400, "Bad Request");
    }
    let method = parts[0].to_string();
    let target = parts[1].to_string();

    let mut authorization: Option<String> = None;
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        if line.trim().is_empty() {
            break;
        }
        if let Some((key, value)) = line.trim().split_once(':') {
            let key = key.trim().to_lowercase();
            let value = value.trim().to_string();
            match key.as_str() {
                "content-length" => content_length = value.parse().unwrap_or(0),
                "authorization" => authorization = Some(value),
                _ => {}
            }
        }
    }

    let body = if content_length > 0 && content_length <= config.max_body_size {
        let mut body = vec![0u8; content_length];
        std::io::Read::read_exact(&mut reader, &mut body)?;
        Some(String::from_utf8_lossy(&body).to_string())
    } else {
        None
    };

    let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));
    let query_params = parse_query_string(query);

    // Static surface: no state access, no gate.
    if method == "GET" && (path == "/" || path == "/health") {
        return send_json(
            &mut stream,
            200,
            &serde_json::json!({
                "service": "synchub",
                "version": env!("CARGO_PKG_VERSION"),
            }),
        );
    }

    // The gate comes before routing: no handler body runs unauthenticated,
    // and the challenge shape is identical whatever the failure cause.
    if !auth.verify(&method, path, authorization.as_deref()) {
        return send_challenge(&mut stream, auth);
    }

    route_request(&mut stream, &method, path, &query_params, body, state)
}

/// Route an authenticated request to its handler
fn route_request(
    stream: &mut TcpStream,
    method: &str,
    path: &str,
    query: &HashMap<String, String>,
    body: Option<String>,
    state: &AppState,
) -> std::io::Result<()> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, segments.as_slice()) {
        ("GET", ["jobs"]) => respond(stream, 200, handle_list_jobs(state)),
        ("GET", ["jobs-status"]) => respond(stream, 200, handle_jobs_status(state)),
        ("GET", ["jobs", "conflicts"]) => send_error(stream, 400, "job id required"),
        ("GET", ["jobs", id]) => respond(stream, 200, handle_get_job(state, id)),
        ("POST", ["jobs"]) | ("POST", ["jobs", "conflicts"]) => match body {
            Some(body) if path.ends_with("/conflicts") => {
                respond(stream, 200, handle_resolve_conflict(state, &body))
            }
            Some(body) => respond(stream, 200, handle_upsert_job(state, &body)),
            None => send_error(stream, 400, "request body required"),
        },
        ("DELETE", ["jobs", id]) => match handle_delete_job(state, id) {
            Ok(()) => send_empty(stream, 204),
            Err(e) => send_failure(stream, &e),
        },
        ("GET", ["jobs", id, "logs"]) => respond(stream, 200, handle_job_logs(state, id, query)),
        ("GET", ["jobs", id, "conflicts"]) => {
            respond(stream, 200, handle_list_conflicts(state, id))
        }
        ("POST", ["jobs", _id, "conflicts"]) => match body {
            Some(body) => respond(stream, 200, handle_resolve_conflict(state, &body)),
            None => send_error(stream, 400, "request body required"),
        },
        ("GET", ["cmd", cmd]) => respond(stream, 200, handle_command(state, cmd, None)),
        ("GET", ["cmd", cmd, id]) => respond(stream, 200, handle_command(state, cmd, Some(id))),
        ("GET", ["ws", id]) => {
            let result = guard_discovery(|| {
                let target = discovery_target(id, query)?;
                handle_workspaces(state, &target)
            });
            respond(stream, 200, result)
        }
        ("GET", ["folders", id]) => {
            let result = guard_discovery(|| {
                let target = discovery_target(id, query)?;
                handle_folders(state, &target)
            });
            respond(stream, 200, result)
        }
        _ => send_error(stream, 404, "Not found"),
    }
}

/// Outermost boundary of the discovery path: a panic inside the proxy stack
/// degrades to a generic 400 with a logged trace, keeping the agent alive
/// even when one remote server misbehaves.
fn guard_discovery<T>(call: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(panic) => {
            error!("discovery call panicked: {:?}", panic);
            Err(SyncHubError::validation("discovery request failed"))
        }
    }
}

/// Interpret the `{id}` segment of a discovery route
///
/// The literal id `request` marks an ad-hoc probe carrying inline
/// query-parameter credentials; anything else names a registered job.
fn discovery_target(id: &str, query: &HashMap<String, String>) -> Result<DiscoveryTarget> {
    if id != "request" {
        return Ok(DiscoveryTarget::Registered { id: id.to_string() });
    }
    let url = query
        .get("url")
        .cloned()
        .ok_or_else(|| SyncHubError::validation("ad-hoc probe needs a url parameter"))?;
    let user = query
        .get("user")
        .cloned()
        .ok_or_else(|| SyncHubError::validation("ad-hoc probe needs a user parameter"))?;
    Ok(DiscoveryTarget::AdHoc {
        url,
        user,
        password: query.get("password").cloned(),
        trust_ssl: query.get("trust_ssl").map(|v| v == "true").unwrap_or(false),
        workspace: query.get("ws").cloned(),
    })
}

/// Parse query string into key-value pairs
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((urlencoding_decode(key), urlencoding_decode(value)))
        })
        .collect()
}

/// Simple URL decoding
fn urlencoding_decode(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                result.push(byte as char);
            }
        } else if c == '+' {
            result.push(' ');
        } else {
            result.push(c);
        }
    }
    result
}

/// Serialize a handler outcome, mapping errors through their HTTP status
fn respond<T: serde::Serialize>(
    stream: &mut TcpStream,
    status: u16,
    result: Result<T>,
) -> std::io::Result<()> {
    match result {
        Ok(value) => send_json(stream, status, &value),
        Err(e) => send_failure(stream, &e),
    }
}

fn send_failure(stream: &mut TcpStream, err: &SyncHubError) -> std::io::Result<()> {
    let status = err.http_status();
    if status >= 500 {
        error!("request failed: {}", err);
    } else {
        debug!("request rejected ({}): {}", status, err);
    }
    send_error(stream, status, &err.to_string())
}

/// Send JSON response
fn send_json<T: serde::Serialize>(
    stream: &mut TcpStream,
    status: u16,
    data: &T,
) -> std::io::Result<()> {
    let body = serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string());
    send_response(stream, status, &body, &[])
}

/// Send error response
fn send_error(stream: &mut TcpStream, status: u16, message: &str) -> std::io::Result<()> {
    let body = serde_json::to_string(&ApiError::new(message)).unwrap_or_default();
    send_response(stream, status, &body, &[])
}

/// Send the digest challenge; the one response shape for every auth failure
fn send_challenge(stream: &mut TcpStream, auth: &DigestAuthGate) -> std::io::Result<()> {
    let challenge = auth.challenge();
    let body = serde_json::to_string(&ApiError::new("Authentication required")).unwrap_or_default();
    send_response(
        stream,
        401,
        &body,
        &[("WWW-Authenticate", challenge.as_str())],
    )
}

fn send_empty(stream: &mut TcpStream, status: u16) -> std::io::Result<()> {
    send_response(stream, status, "", &[])
}

/// Send HTTP response
fn send_response(
    stream: &mut TcpStream,
    status: u16,
    body: &str,
    extra_headers: &[(&str, &str)],
) -> std::io::Result<()> {
    let status_text = match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        500 => "Internal Server Error",
        _ => "Unknown",
    };

    let mut response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n",
        status,
        status_text,
        body.len(),
    );
    for (name, value) in extra_headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("Connection: close\r\n\r\n");
    response.push_str(body);

    stream.write_all(response.as_bytes())?;
    stream.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::{client_response, parse_challenge_nonce};
    use crate::engine::AgentScheduler;
    use crate::job::JobRegistry;
    use crate::remote::RemoteClient;
    use crate::secrets::MemoryCredentialStore;
    use std::io::Read;
    use tempfile::TempDir;

    struct TestServer {
        addr: String,
        state: Arc<AppState>,
        _shutdown: Arc<AtomicBool>,
        dir: TempDir,
    }

    fn spawn_server() -> TestServer {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(AppState::new(
            JobRegistry::new(dir.path()),
            Arc::new(MemoryCredentialStore::new()),
            AgentScheduler::start(),
            RemoteClient::default(),
            dir.path().join("parent"),
        ));
        let auth = Arc::new(DigestAuthGate::new("SyncHubAuthRealm"));
        auth.add_user("admin", "s3cret");

        let port = {
            let probe = TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let config = ControlApiConfig {
            bind: "127.0.0.1".into(),
            port,
            ..Default::default()
        };
        let server = ControlApiServer::new(config, Arc::clone(&state), auth);
        let shutdown = server.shutdown_flag();
        thread::spawn(move || {
            let _ = server.run();
        });
        // Wait for the listener to come up.
        let addr = format!("127.0.0.1:{}", port);
        for _ in 0..50 {
            if TcpStream::connect(&addr).is_ok() {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(20));
        }
        TestServer {
            addr,
            state,
            _shutdown: shutdown,
            dir,
        }
    }

    fn raw_request(addr: &str, request: &str) -> (u16, HashMap<String, String>, String) {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        let (head, body) = response.split_once("\r\n\r\n").unwrap_or((response.as_str(), ""));
        let mut lines = head.lines();
        let status: u16 = lines
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let headers: HashMap<String, String> = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .collect();
        (status, headers, body.to_string())
    }

    fn get(addr: &str, path: &str, authorization: Option<&str>) -> (u16, HashMap<String, String>, String) {
        let auth_line = authorization
            .map(|a| format!("Authorization: {}\r\n", a))
            .unwrap_or_default();
        raw_request(
            addr,
            &format!("GET {} HTTP/1.1\r\nHost: local\r\n{}\r\n", path, auth_line),
        )
    }

    fn post(
        addr: &str,
        path: &str,
        body: &str,
        authorization: Option<&str>,
    ) -> (u16, HashMap<String, String>, String) {
        let auth_line = authorization
            .map(|a| format!("Authorization: {}\r\n", a))
            .unwrap_or_default();
        raw_request(
            addr,
            &format!(
                "POST {} HTTP/1.1\r\nHost: local\r\nContent-Length: {}\r\n{}\r\n{}",
                path,
                body.len(),
                auth_line,
                body
            ),
        )
    }

    /// Answer the server's challenge for one request
    fn authorize(addr: &str, method: &str, path: &str) -> String {
        let (status, headers, _) = get(addr, "/jobs", None);
        assert_eq!(status, 401);
        let nonce = parse_challenge_nonce(&headers["www-authenticate"]).unwrap();
        client_response("admin", "s3cret", "SyncHubAuthRealm", &nonce, method, path)
    }

    #[test]
    fn test_health_is_open() {
        let server = spawn_server();
        let (status, _, body) = get(&server.addr, "/health", None);
        assert_eq!(status, 200);
        assert!(body.contains("synchub"));
    }

    #[test]
    fn test_unauthenticated_request_gets_challenge_and_no_side_effects() {
        let server = spawn_server();
        let body = r#"{"server": "https://ex.com", "workspace": "ws1", "directory": "/tmp/d"}"#;
        let (status, headers, _) = post(&server.addr, "/jobs", body, None);
        assert_eq!(status, 401);
        assert!(headers["www-authenticate"].starts_with("Digest realm="));
        // Nothing was created: no registry document, no job.
        assert!(!server.dir.path().join("configs.json").exists());
        let mut registry = server.state.registry.lock().unwrap();
        assert!(registry.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_bad_digest_is_rejected_like_missing_one() {
        let server = spawn_server();
        let (_, headers, _) = get(&server.addr, "/jobs", None);
        let nonce = parse_challenge_nonce(&headers["www-authenticate"]).unwrap();
        let bad = client_response("admin", "wrong", "SyncHubAuthRealm", &nonce, "GET", "/jobs");
        let (status, headers, body) = get(&server.addr, "/jobs", Some(&bad));
        assert_eq!(status, 401);
        assert!(headers.contains_key("www-authenticate"));
        assert!(body.contains("Authentication required"));
    }

    #[test]
    fn test_job_lifecycle_over_http() {
        let server = spawn_server();

        // Create.
        let auth = authorize(&server.addr, "POST", "/jobs");
        let body = r#"{"server": "https://ex.com", "workspace": "ws1", "directory": "/tmp/d"}"#;
        let (status, _, response) = post(&server.addr, "/jobs", body, Some(&auth));
        assert_eq!(status, 200);
        assert!(response.contains("\"ex.com-ws1\""));

        // List.
        let auth = authorize(&server.addr, "GET", "/jobs");
        let (status, _, response) = get(&server.addr, "/jobs", Some(&auth));
        assert_eq!(status, 200);
        assert!(response.contains("ex.com-ws1"));

        // Status view carries the connectivity flag.
        let auth = authorize(&server.addr, "GET", "/jobs-status");
        let (status, _, response) = get(&server.addr, "/jobs-status", Some(&auth));
        assert_eq!(status, 200);
        assert!(response.contains("is_connected_to_internet"));

        // Delete → 204 and the data directory is gone.
        let auth = authorize(&server.addr, "DELETE", "/jobs/ex.com-ws1");
        let (status, _, _) = raw_request(
            &server.addr,
            &format!(
                "DELETE /jobs/ex.com-ws1 HTTP/1.1\r\nHost: local\r\nAuthorization: {}\r\n\r\n",
                auth
            ),
        );
        assert_eq!(status, 204);
        assert!(!server.dir.path().join("ex.com-ws1").exists());

        let auth = authorize(&server.addr, "GET", "/jobs/ex.com-ws1");
        let (status, _, _) = get(&server.addr, "/jobs/ex.com-ws1", Some(&auth));
        assert_eq!(status, 404);
    }

    #[test]
    fn test_unknown_route_is_404() {
        let server = spawn_server();
        let auth = authorize(&server.addr, "GET", "/nope");
        let (status, _, _) = get(&server.addr, "/nope", Some(&auth));
        assert_eq!(status, 404);
    }

    #[test]
    fn test_adhoc_probe_requires_url_parameter() {
        let server = spawn_server();
        let auth = authorize(&server.addr, "GET", "/ws/request");
        let (status, _, body) = get(&server.addr, "/ws/request", Some(&auth));
        assert_eq!(status, 400);
        assert!(body.contains("url"));
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("url=https%3A%2F%2Fex.com&user=alice&trust_ssl=true");
        assert_eq!(params.get("url"), Some(&"https://ex.com".to_string()));
        assert_eq!(params.get("user"), Some(&"alice".to_string()));
        assert_eq!(params.get("trust_ssl"), Some(&"true".to_string()));
    }

    #[test]
    fn test_discovery_target_parsing() {
        let target = discovery_target("ex.com-ws1", &HashMap::new()).unwrap();
        assert_eq!(
            target,
            DiscoveryTarget::Registered {
                id: "ex.com-ws1".into()
            }
        );

        let params = parse_query_string("url=https://ex.com/&user=alice&password=pw&ws=ws1");
        let target = discovery_target("request", &params).unwrap();
        match target {
            DiscoveryTarget::AdHoc {
                url,
                user,
                password,
                trust_ssl,
                workspace,
            } => {
                assert_eq!(url, "https://ex.com/");
                assert_eq!(user, "alice");
                assert_eq!(password.as_deref(), Some("pw"));
                assert!(!trust_ssl);
                assert_eq!(workspace.as_deref(), Some("ws1"));
            }
            other => panic!("expected ad-hoc target, got {:?}", other),
        }
    }
}
