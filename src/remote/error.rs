//! Remote proxy error taxonomy
//!
//! Every failure of a proxied discovery call maps to a stable
//! (status, message) pair. Callers dispatch on that pair; the underlying
//! transport error never crosses this boundary.

use reqwest::StatusCode;
use thiserror::Error;

/// Stable classification of remote discovery failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Remote path invalid or no server install at that URL
    #[error("Server not found (404), is it up and does it host a sync server?")]
    NotFound,

    /// Credentials rejected by the remote server
    #[error("Authentication failed: please verify your login and password")]
    Unauthorized,

    /// Authenticated but not allowed
    #[error("Access to the server is forbidden")]
    Forbidden,

    /// Remote server trouble (5xx or upstream request timeout)
    #[error("Server seems to be encountering problems ({0})")]
    ServerError(u16),

    /// TLS verification failure (certificate mismatch, self-signed cert)
    #[error("An SSL error happened! Is your server using a self-signed certificate? In that case please check 'Trust SSL certificate'")]
    Ssl,

    /// Local proxy misconfiguration
    #[error("A proxy error happened, please check the logs")]
    Proxy,

    /// Redirect loop while reaching the server
    #[error("Connection error: too many redirects")]
    TooManyRedirects,

    /// Chunked transfer or content decoding failed mid-response
    #[error("Response decoding error, please check the logs")]
    Decode,

    /// Malformed endpoint supplied by the caller
    #[error("Http connection error: invalid schema or URL")]
    InvalidUrl,

    /// No response within the client-side deadline
    #[error("Connection timeout!")]
    Timeout,

    /// DNS or generic connectivity failure
    #[error("Cannot resolve domain!")]
    Connection,

    /// 2xx response whose body could not be parsed
    #[error("Error while parsing the server response")]
    MalformedPayload,

    /// Any other HTTP error status
    #[error("Couldn't reach the server, check your server!")]
    Http(u16),
}

impl RemoteError {
    /// HTTP status reported to the control-plane caller
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::ServerError(code) | Self::Http(code) => *code,
            Self::Ssl
            | Self::Proxy
            | Self::TooManyRedirects
            | Self::Decode
            | Self::InvalidUrl
            | Self::Timeout
            | Self::Connection
            | Self::MalformedPayload => 400,
        }
    }

    /// Classify a non-2xx HTTP status
    pub fn from_http_status(status: StatusCode) -> Self {
        match status.as_u16() {
            404 => Self::NotFound,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            408 => Self::ServerError(408),
            code if status.is_server_error() => Self::ServerError(code),
            code => Self::Http(code),
        }
    }

    /// Classify a transport-level failure
    ///
    /// Inspects the error's source chain because reqwest folds TLS and proxy
    /// causes into generic connect errors.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if err.is_redirect() {
            return Self::TooManyRedirects;
        }
        if err.is_builder() {
            return Self::InvalidUrl;
        }
        if err.is_decode() || err.is_body() {
            return Self::Decode;
        }
        if let Some(status) = err.status() {
            return Self::from_http_status(status);
        }

        let chain = source_chain(err);
        if chain.contains("certificate") || chain.contains("ssl") || chain.contains("tls") {
            Self::Ssl
        } else if chain.contains("proxy") {
            Self::Proxy
        } else {
            Self::Connection
        }
    }
}

/// Lowercased concatenation of an error's source chain
fn source_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(' ');
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_contract() {
        assert_eq!(RemoteError::NotFound.status(), 404);
        assert_eq!(RemoteError::Unauthorized.status(), 401);
        assert_eq!(RemoteError::Forbidden.status(), 403);
        assert_eq!(RemoteError::ServerError(500).status(), 500);
        assert_eq!(RemoteError::ServerError(408).status(), 408);
        assert_eq!(RemoteError::Ssl.status(), 400);
        assert_eq!(RemoteError::Proxy.status(), 400);
        assert_eq!(RemoteError::TooManyRedirects.status(), 400);
        assert_eq!(RemoteError::Decode.status(), 400);
        assert_eq!(RemoteError::InvalidUrl.status(), 400);
        assert_eq!(RemoteError::Timeout.status(), 400);
        assert_eq!(RemoteError::Connection.status(), 400);
        assert_eq!(RemoteError::MalformedPayload.status(), 400);
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(
            RemoteError::from_http_status(StatusCode::NOT_FOUND),
            RemoteError::NotFound
        );
        assert_eq!(
            RemoteError::from_http_status(StatusCode::UNAUTHORIZED),
            RemoteError::Unauthorized
        );
        assert_eq!(
            RemoteError::from_http_status(StatusCode::FORBIDDEN),
            RemoteError::Forbidden
        );
        assert_eq!(
            RemoteError::from_http_status(StatusCode::INTERNAL_SERVER_ERROR),
            RemoteError::ServerError(500)
        );
        assert_eq!(
            RemoteError::from_http_status(StatusCode::REQUEST_TIMEOUT),
            RemoteError::ServerError(408)
        );
        assert_eq!(
            RemoteError::from_http_status(StatusCode::IM_A_TEAPOT),
            RemoteError::Http(418)
        );
    }

    #[test]
    fn test_messages_are_stable() {
        // Callers dispatch on (status, message); the strings are a contract.
        assert!(RemoteError::Timeout.to_string().contains("timeout"));
        assert!(RemoteError::Unauthorized
            .to_string()
            .contains("login and password"));
        assert!(RemoteError::Ssl.to_string().contains("SSL"));
    }
}
