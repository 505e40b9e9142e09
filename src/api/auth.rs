//! Digest authentication gate
//!
//! Challenge-response protection for every control-plane operation. The gate
//! keeps `(user → HA1)` pairs seeded at startup and a set of nonces it has
//! issued; requests must answer a challenge with a valid SHA-256 digest
//! before any handler runs. The failure response is identical whatever the
//! cause, so probing cannot distinguish a missing user from a bad digest.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Cap on remembered nonces; the set is cleared when it fills up, which at
/// worst forces clients through one extra challenge round-trip.
const MAX_NONCES: usize = 1024;

fn h(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Parsed fields of a `Authorization: Digest …` header
#[derive(Debug, Default)]
struct DigestFields {
    username: String,
    realm: String,
    nonce: String,
    uri: String,
    response: String,
    qop: Option<String>,
    nc: Option<String>,
    cnonce: Option<String>,
}

fn parse_digest_header(header: &str) -> Option<DigestFields> {
    let rest = header.trim().strip_prefix("Digest ")?;
    let mut fields = DigestFields::default();
    for part in split_params(rest) {
        let (key, value) = part.split_once('=')?;
        let value = value.trim().trim_matches('"').to_string();
        match key.trim() {
            "username" => fields.username = value,
            "realm" => fields.realm = value,
            "nonce" => fields.nonce = value,
            "uri" => fields.uri = value,
            "response" => fields.response = value,
            "qop" => fields.qop = Some(value),
            "nc" => fields.nc = Some(value),
            "cnonce" => fields.cnonce = Some(value),
            _ => {}
        }
    }
    if fields.username.is_empty() || fields.nonce.is_empty() || fields.response.is_empty() {
        return None;
    }
    Some(fields)
}

/// Split on commas that are not inside quoted values
fn split_params(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in input.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(input[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(input[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// The authentication gate wrapped around every control-plane operation
pub struct DigestAuthGate {
    realm: String,
    /// user → HA1 (hex SHA-256 of `user:realm:password`)
    users: RwLock<HashMap<String, String>>,
    issued_nonces: Mutex<HashSet<String>>,
}

impl DigestAuthGate {
    /// Create a gate for the given realm
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            users: RwLock::new(HashMap::new()),
            issued_nonces: Mutex::new(HashSet::new()),
        }
    }

    /// Seed a user; the password itself is hashed away immediately
    pub fn add_user(&self, user: &str, password: &str) {
        let ha1 = h(&format!("{}:{}:{}", user, self.realm, password));
        self.users
            .write()
            .expect("auth gate poisoned")
            .insert(user.to_string(), ha1);
    }

    /// Build the `WWW-Authenticate` header value for a challenge response
    pub fn challenge(&self) -> String {
        let mut raw = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut raw);
        let nonce = hex::encode(raw);
        {
            let mut issued = self.issued_nonces.lock().expect("auth gate poisoned");
            if issued.len() >= MAX_NONCES {
                issued.clear();
            }
            issued.insert(nonce.clone());
        }
        format!(
            "Digest realm=\"{}\", qop=\"auth\", algorithm=SHA-256, nonce=\"{}\"",
            self.realm, nonce
        )
    }

    /// Verify an `Authorization` header against a request
    ///
    /// Returns false for any defect: absent header, unknown user, foreign
    /// nonce, wrong digest, URI mismatch. Callers must not leak which.
    pub fn verify(&self, method: &str, request_path: &str, authorization: Option<&str>) -> bool {
        let Some(fields) = authorization.and_then(parse_digest_header) else {
            return false;
        };
        if fields.realm != self.realm {
            return false;
        }
        if !self
            .issued_nonces
            .lock()
            .expect("auth gate poisoned")
            .contains(&fields.nonce)
        {
            return false;
        }
        // The digest covers the client's uri field; it must name this request.
        if fields.uri.split('?').next() != request_path.split('?').next() {
            return false;
        }
        let Some(ha1) = self
            .users
            .read()
            .expect("auth gate poisoned")
            .get(&fields.username)
            .cloned()
        else {
            return false;
        };

        let ha2 = h(&format!("{}:{}", method, fields.uri));
        let expected = match (&fields.qop, &fields.nc, &fields.cnonce) {
            (Some(qop), Some(nc), Some(cnonce)) => h(&format!(
                "{}:{}:{}:{}:{}:{}",
                ha1, fields.nonce, nc, cnonce, qop, ha2
            )),
            _ => h(&format!("{}:{}:{}", ha1, fields.nonce, ha2)),
        };
        expected == fields.response
    }

    /// Realm presented in challenges
    pub fn realm(&self) -> &str {
        &self.realm
    }
}

impl std::fmt::Debug for DigestAuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let users = self.users.read().map(|u| u.len()).unwrap_or(0);
        f.debug_struct("DigestAuthGate")
            .field("realm", &self.realm)
            .field("users", &format!("[{} REDACTED]", users))
            .finish()
    }
}

/// Compute a client-side digest response for a previously issued challenge
///
/// Mirrors what a front-end does; used by the bundled diagnostics and the
/// test suite.
pub fn client_response(
    user: &str,
    password: &str,
    realm: &str,
    nonce: &str,
    method: &str,
    uri: &str,
) -> String {
    let ha1 = h(&format!("{}:{}:{}", user, realm, password));
    let ha2 = h(&format!("{}:{}", method, uri));
    let nc = "00000001";
    let cnonce = "0a4f113b";
    let response = h(&format!(
        "{}:{}:{}:{}:auth:{}",
        ha1, nonce, nc, cnonce, ha2
    ));
    format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", qop=auth, nc={}, cnonce=\"{}\", response=\"{}\", algorithm=SHA-256",
        user, realm, nonce, uri, nc, cnonce, response
    )
}

/// Extract the nonce from a `WWW-Authenticate` challenge header value
pub fn parse_challenge_nonce(challenge: &str) -> Option<String> {
    challenge
        .split(',')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("nonce="))
        .map(|raw| raw.trim_matches('"').to_string())
}
