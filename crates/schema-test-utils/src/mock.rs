//! [`MockTransport`]: scripted responses per (method, path) with a call log.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use schema_transport::{Method, Request, Response, Transport, TransportError};
use serde_json::Value;

/// One scripted outcome for a request.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// The remote answered with this response
    Respond(Response),
    /// No response was received
    Fail(TransportError),
    /// Sleep before producing the inner outcome
    Delayed(Duration, Box<Scripted>),
}

impl Scripted {
    pub fn json(status: u16, body: Value) -> Self {
        Self::Respond(Response::new(status, body.to_string()))
    }

    /// `{"code": ..., "message": ...}` error body with the given status.
    pub fn error(status: u16, code: &str, message: &str) -> Self {
        Self::json(status, serde_json::json!({"code": code, "message": message}))
    }

    pub fn timeout() -> Self {
        Self::Fail(TransportError::timeout("scripted timeout"))
    }

    pub fn refused() -> Self {
        Self::Fail(TransportError::connect("scripted connection refused"))
    }

    pub fn after(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

/// A request as the mock saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    /// Body parsed as JSON, when there was one
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

/// In-memory [`Transport`] driven by per-route scripts.
///
/// Each (method, path) route holds a queue of outcomes consumed in order.
/// The last outcome of a queue repeats forever, so a poll endpoint scripted
/// with `[empty, empty, ready]` keeps answering `ready`. Requests to
/// unscripted routes fail with a non-timeout transport error.
///
/// # Example
///
/// ```rust
/// use schema_test_utils::{MockTransport, Scripted};
/// use schema_transport::{Method, Request, Transport};
///
/// let mock = MockTransport::new();
/// mock.script(Method::Get, "/v1/ping", [Scripted::json(200, serde_json::json!({}))]);
///
/// let response = mock.call(&Request::get("/v1/ping")).unwrap();
/// assert_eq!(response.status, 200);
/// assert_eq!(mock.count(Method::Get, "/v1/ping"), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append outcomes to a route's queue.
    pub fn script(
        &self,
        method: Method,
        path: impl Into<String>,
        outcomes: impl IntoIterator<Item = Scripted>,
    ) -> &Self {
        let mut routes = self.routes.lock().unwrap();
        routes
            .entry((method, path.into()))
            .or_default()
            .extend(outcomes);
        self
    }

    /// Shorthand for a single JSON response.
    pub fn respond(&self, method: Method, path: impl Into<String>, status: u16, body: Value) -> &Self {
        self.script(method, path, [Scripted::json(status, body)])
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls made to one route.
    pub fn calls_to(&self, method: Method, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.path == path)
            .collect()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls_to(method, path).len()
    }

    pub fn count_method(&self, method: Method) -> usize {
        self.calls().iter().filter(|c| c.method == method).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_outcome(&self, method: Method, path: &str) -> Option<Scripted> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(&(method, path.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Transport for MockTransport {
    fn call(&self, request: &Request) -> schema_transport::Result<Response> {
        let body = request
            .body
            .as_deref()
            .map(|b| serde_json::from_slice(b).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(b).into_owned())));
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method,
            path: request.path.clone(),
            body,
            timeout: request.timeout,
        });

        let mut outcome = self.next_outcome(request.method, &request.path);
        loop {
            match outcome {
                Some(Scripted::Respond(response)) => return Ok(response),
                Some(Scripted::Fail(err)) => return Err(err),
                Some(Scripted::Delayed(delay, inner)) => {
                    std::thread::sleep(delay);
                    outcome = Some(*inner);
                }
                None => {
                    return Err(TransportError::other(format!(
                        "no scripted response for {} {}",
                        request.method, request.path
                    )));
                }
            }
        }
    }
}
