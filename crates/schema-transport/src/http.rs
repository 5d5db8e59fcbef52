//! Blocking HTTP implementation of [`Transport`] on top of `ureq`

use std::io::ErrorKind;
use std::time::Duration;

use tracing::debug;
use ureq::{Agent, RequestBuilder};

use crate::{Method, Request, Response, Result, Transport, TransportError};

const JSON: &str = "application/json";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Response body cap. ureq's own default is 10 MB.
const DEFAULT_MAX_BODY: u64 = 64 * 1024 * 1024;

/// Builder for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportBuilder {
    base_url: String,
    authorization: Option<String>,
    default_timeout: Duration,
    max_body_size: u64,
}

impl HttpTransportBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            authorization: None,
            default_timeout: DEFAULT_TIMEOUT,
            max_body_size: DEFAULT_MAX_BODY,
        }
    }

    /// Value of the `Authorization` header sent with every request.
    pub fn authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Timeout for requests that do not carry their own.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Largest response body accepted, in bytes.
    pub fn max_body_size(mut self, bytes: u64) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn build(self) -> HttpTransport {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(self.default_timeout))
            .build()
            .into();

        HttpTransport {
            agent,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            authorization: self.authorization,
            max_body_size: self.max_body_size,
        }
    }
}

/// [`Transport`] that talks JSON over HTTPS.
///
/// Non-2xx statuses come back as [`Response`]s; only failures where no
/// response was received become [`TransportError`]s.
pub struct HttpTransport {
    agent: Agent,
    base_url: String,
    authorization: Option<String>,
    max_body_size: u64,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("authorization", &self.authorization.as_ref().map(|_| "<redacted>"))
            .field("max_body_size", &self.max_body_size)
            .finish()
    }
}

impl HttpTransport {
    pub fn builder(base_url: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn prepare<B>(&self, builder: RequestBuilder<B>, timeout: Option<Duration>) -> RequestBuilder<B> {
        let mut builder = builder.header("Accept", JSON);
        if let Some(auth) = &self.authorization {
            builder = builder.header("Authorization", auth.as_str());
        }
        match timeout {
            Some(timeout) => builder.config().timeout_global(Some(timeout)).build(),
            None => builder,
        }
    }
}

impl Transport for HttpTransport {
    fn call(&self, request: &Request) -> Result<Response> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = %request.method, url = %url, timeout = ?request.timeout, "Sending request");

        let result = match request.method {
            Method::Get => self.prepare(self.agent.get(url.as_str()), request.timeout).call(),
            Method::Post | Method::Patch => {
                let builder = if request.method == Method::Post {
                    self.agent.post(url.as_str())
                } else {
                    self.agent.patch(url.as_str())
                };
                let body: &[u8] = request.body.as_deref().unwrap_or_default();
                self.prepare(builder, request.timeout)
                    .header("Content-Type", JSON)
                    .send(body)
            }
        };

        let mut response = result.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .with_config()
            .limit(self.max_body_size)
            .read_to_vec()
            .map_err(classify)?;
        debug!(method = %request.method, url = %url, status, "Received response");

        Ok(Response::new(status, body))
    }
}

fn classify(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(which) => TransportError::timeout(format!("timed out ({which:?})")),
        ureq::Error::Io(io) if io.kind() == ErrorKind::TimedOut => {
            TransportError::timeout(io.to_string())
        }
        ureq::Error::Io(io)
            if matches!(
                io.kind(),
                ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
            ) =>
        {
            TransportError::connect(io.to_string())
        }
        ureq::Error::BodyExceedsLimit(limit) => TransportError::body_too_large(limit),
        ureq::Error::HostNotFound => TransportError::connect("host not found"),
        ureq::Error::ConnectionFailed => TransportError::connect("connection failed"),
        other => TransportError::other(other.to_string()),
    }
}
