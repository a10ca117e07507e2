//! Deterministic transport for tests and dry runs.

use super::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

type Scripted = Result<HttpResponse, TransportError>;

#[derive(Debug)]
struct Route {
    method: Method,
    prefix: String,
    queue: VecDeque<Scripted>,
}

/// Fake transport replaying scripted responses.
///
/// A request is matched to the route with the same method and the longest
/// URL prefix. Each matching request consumes the next queued entry; the
/// last entry repeats once the queue is drained. Every request is recorded.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a sequence of responses for `method` on URLs starting with `prefix`.
    pub fn on(&self, method: Method, prefix: &str, responses: impl IntoIterator<Item = HttpResponse>) -> &Self {
        self.script(method, prefix, responses.into_iter().map(Ok))
    }

    /// Script a sequence of JSON responses sharing one status.
    pub fn on_json(&self, method: Method, prefix: &str, status: u16, bodies: impl IntoIterator<Item = Value>) -> &Self {
        self.on(
            method,
            prefix,
            bodies.into_iter().map(|b| HttpResponse::json_body(status, &b)),
        )
    }

    /// Script a transport failure for `method` on `prefix`.
    pub fn on_error(&self, method: Method, prefix: &str, error: TransportError) -> &Self {
        self.script(method, prefix, std::iter::once(Err(error)))
    }

    /// Script a mixed sequence of responses and failures.
    pub fn script(&self, method: Method, prefix: &str, entries: impl IntoIterator<Item = Scripted>) -> &Self {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        match routes
            .iter_mut()
            .find(|r| r.method == method && r.prefix == prefix)
        {
            Some(route) => route.queue.extend(entries),
            None => routes.push(Route {
                method,
                prefix: prefix.to_string(),
                queue: entries.into_iter().collect(),
            }),
        }
        self
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of requests for `method` whose URL starts with `prefix`.
    pub fn count(&self, method: Method, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.method == method && c.url.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let route = routes
            .iter_mut()
            .filter(|r| r.method == request.method && request.url.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len());

        let unrouted = || TransportError::Unrouted {
            method: request.method,
            url: request.url.clone(),
        };

        match route {
            Some(route) if route.queue.len() > 1 => route.queue.pop_front().unwrap_or_else(|| Err(unrouted())),
            Some(route) => route.queue.front().cloned().unwrap_or_else(|| Err(unrouted())),
            None => Err(unrouted()),
        }
    }
}
