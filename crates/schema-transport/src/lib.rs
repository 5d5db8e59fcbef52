//! Transport contract for the schema reconciler
//!
//! The engine never talks HTTP directly. It issues [`Request`]s through a
//! [`Transport`] and receives either a [`Response`] (any status, including
//! errors reported by the remote) or a [`TransportError`] when no response
//! arrived at all. Timeouts are classified separately from other network
//! failures because a timed-out action may still complete remotely.

pub mod error;
pub mod http;

use std::fmt;
use std::time::Duration;

pub use error::{Result, TransportError, TransportErrorKind};
pub use http::{HttpTransport, HttpTransportBuilder};

/// HTTP methods used against the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One request against the remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Path relative to the transport's base URL, already percent-encoded
    pub path: String,
    pub body: Option<Vec<u8>>,
    /// Upper bound for this single call; `None` uses the transport default
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            timeout: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            timeout: None,
        }
    }

    pub fn patch(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Patch,
            path: path.into(),
            body: Some(body),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A response received from the remote, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Issues a single request and returns the remote's response.
///
/// Implementations must be safe to share between threads: sibling scopes
/// may be applied concurrently.
pub trait Transport: Send + Sync {
    fn call(&self, request: &Request) -> Result<Response>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn call(&self, request: &Request) -> Result<Response> {
        (**self).call(request)
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn call(&self, request: &Request) -> Result<Response> {
        (**self).call(request)
    }
}

/// Join path segments into an API path, percent-encoding each segment.
///
/// ```
/// use schema_transport::api_path;
///
/// assert_eq!(api_path(&["v1", "schemas", "my schema"]), "/v1/schemas/my%20schema");
/// ```
pub fn api_path(segments: &[&str]) -> String {
    segments.iter().fold(String::new(), |mut path, segment| {
        path.push('/');
        path.push_str(&urlencoding::encode(segment));
        path
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(200, true)]
    #[case(204, true)]
    #[case(299, true)]
    #[case(301, false)]
    #[case(404, false)]
    #[case(409, false)]
    #[case(500, false)]
    fn test_response_success(#[case] status: u16, #[case] expected: bool) {
        assert_eq!(Response::new(status, Vec::new()).is_success(), expected);
    }

    #[test]
    fn test_api_path_encodes_segments() {
        assert_eq!(
            api_path(&["v1", "connectors", "c1", "schemas", "sales/eu", "tables", "a.b"]),
            "/v1/connectors/c1/schemas/sales%2Feu/tables/a.b"
        );
    }

    #[test]
    fn test_timeout_classification() {
        assert!(TransportError::timeout("read timed out").is_timeout());
        assert!(!TransportError::connect("refused").is_timeout());
        assert!(!TransportError::other("tls").is_timeout());
    }

    #[test]
    fn test_request_builders() {
        let request = Request::patch("/v1/x", b"{}".to_vec()).with_timeout(Duration::from_secs(5));
        assert_eq!(request.method, Method::Patch);
        assert_eq!(request.body.as_deref(), Some(&b"{}"[..]));
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }
}
