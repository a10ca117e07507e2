//! Helpers shared by the remote analyzers.

use crate::config::ServiceEndpoint;
use crate::core::errors::AnalyzerError;
use crate::poll::{PollConfig, PollMode, RemoteError};
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use serde_json::Value;
use std::time::Duration;

/// Submit-and-wait unless the caller only wants the submission id.
pub fn submit_mode(wait_for_completion: bool) -> PollMode {
    if wait_for_completion {
        PollMode::SubmitAndWait
    } else {
        PollMode::SubmitOnly
    }
}

/// Poll configuration from the common `max_tries`/`poll_distance` pair.
pub fn poll_config(mode: PollMode, max_tries: u32, poll_distance_secs: u64) -> PollConfig {
    PollConfig::new(mode).with_poll(max_tries, Duration::from_secs(poll_distance_secs))
}

/// Send a request; 5xx responses count as transport failures.
pub async fn send(transport: &dyn Transport, request: HttpRequest) -> Result<HttpResponse, RemoteError> {
    let url = request.url.clone();
    let response = transport.send(request).await?;
    if response.status >= 500 {
        return Err(RemoteError::Transport(TransportError::Status {
            status: response.status,
            url,
        }));
    }
    Ok(response)
}

/// Decode a JSON body or report it as malformed.
pub fn json_body(response: &HttpResponse) -> Result<Value, RemoteError> {
    response
        .json::<Value>()
        .map_err(|e| RemoteError::Malformed(e.to_string()))
}

/// A response the integration cannot act on.
pub fn unexpected(response: &HttpResponse) -> RemoteError {
    let body = String::from_utf8_lossy(&response.body);
    let snippet: String = body.chars().take(200).collect();
    RemoteError::Rejected(format!("HTTP {}: {}", response.status, snippet))
}

/// String or number field rendered as a string.
pub fn id_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// API key for `endpoint`, or `InvalidParameters` before any call is made.
pub fn require_key(endpoint: &ServiceEndpoint, analyzer: &str) -> Result<String, AnalyzerError> {
    endpoint
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AnalyzerError::invalid_parameters(format!("{}: no API key configured", analyzer)))
}
