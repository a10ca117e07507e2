//! Cuckoo_Scan: detonate the file in a Cuckoo sandbox.

use super::remote::{self, id_field, json_body, unexpected};
use super::{Analyzer, AnalyzerContext, Services};
use crate::config::ServiceEndpoint;
use crate::core::errors::AnalyzerError;
use crate::poll::{PollEngine, RemoteError, RemoteJob, RemoteStatus, Submission};
use crate::transport::{HttpRequest, Transport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuckooParams {
    pub max_post_tries: u32,
    pub max_poll_tries: u32,
    /// Seconds between status polls
    pub poll_distance: u64,
    pub wait_for_completion: bool,
}

impl Default for CuckooParams {
    fn default() -> Self {
        Self {
            max_post_tries: 5,
            max_poll_tries: 20,
            poll_distance: 30,
            wait_for_completion: true,
        }
    }
}

const SUBMIT_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct CuckooScan {
    ctx: AnalyzerContext,
    engine: PollEngine,
    transport: Arc<dyn Transport>,
    endpoint: ServiceEndpoint,
}

impl CuckooScan {
    pub fn new(ctx: AnalyzerContext, params: CuckooParams, services: &Services) -> Self {
        let config = remote::poll_config(
            remote::submit_mode(params.wait_for_completion),
            params.max_poll_tries,
            params.poll_distance,
        )
        .with_submit(params.max_post_tries, SUBMIT_RETRY_DELAY);
        Self {
            engine: PollEngine::new(ctx.name.clone(), config),
            ctx,
            transport: services.transport.clone(),
            endpoint: services.config.cuckoo.clone(),
        }
    }

    fn request(&self, request: HttpRequest) -> HttpRequest {
        match &self.endpoint.api_key {
            Some(key) if !key.is_empty() => request.header("Authorization", format!("Bearer {}", key)),
            _ => request,
        }
    }
}

/// Map a `task.status` value.
fn task_status(status: &str, body: &Value) -> Result<RemoteStatus, RemoteError> {
    match status {
        "reported" => Ok(RemoteStatus::Completed(body.clone())),
        "pending" | "running" | "completed" => Ok(RemoteStatus::Pending),
        s if s.starts_with("failed") => Ok(RemoteStatus::Failed(format!("cuckoo task {}", s))),
        other => Err(RemoteError::Malformed(format!("unknown task status '{}'", other))),
    }
}

/// Condense the full JSON report to what analysts look at first.
fn summarize(task_id: &str, report: &Value) -> Value {
    let signatures: Vec<Value> = report["signatures"]
        .as_array()
        .map(|sigs| {
            sigs.iter()
                .map(|s| {
                    json!({
                        "name": s["name"],
                        "description": s["description"],
                        "severity": s["severity"],
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    let strings = |pointer: &str, field: &str| -> Vec<Value> {
        report
            .pointer(pointer)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| if item.is_string() { item.clone() } else { item[field].clone() })
                    .filter(|v| !v.is_null())
                    .collect()
            })
            .unwrap_or_default()
    };

    json!({
        "task_id": task_id,
        "score": report.pointer("/info/score"),
        "duration": report.pointer("/info/duration"),
        "signatures": signatures,
        "domains": strings("/network/domains", "domain"),
        "hosts": strings("/network/hosts", "ip"),
        "dropped_files": report["dropped"].as_array().map_or(0, Vec::len),
    })
}

#[async_trait]
impl RemoteJob for CuckooScan {
    async fn submit(&self) -> Result<Submission, RemoteError> {
        let file = self
            .ctx
            .file()
            .map_err(|e| RemoteError::Rejected(e.detail))?;
        let url = format!("{}/tasks/create/file", self.endpoint.base());
        let request = self.request(HttpRequest::post(url).file("file", file.file_name(), file.data().clone(), Vec::new()));
        let response = remote::send(self.transport.as_ref(), request).await?;
        if !response.is_success() {
            return Err(unexpected(&response));
        }
        let body = json_body(&response)?;
        id_field(&body["task_id"])
            .map(Submission::Accepted)
            .ok_or_else(|| RemoteError::Malformed("no task_id in submission response".into()))
    }

    async fn poll(&self, task_id: &str) -> Result<RemoteStatus, RemoteError> {
        let url = format!("{}/tasks/view/{}", self.endpoint.base(), task_id);
        let response = remote::send(self.transport.as_ref(), self.request(HttpRequest::get(url))).await?;
        if response.status == 404 {
            return Ok(RemoteStatus::Missing(format!("cuckoo task {} not found", task_id)));
        }
        if !response.is_success() {
            return Err(unexpected(&response));
        }
        let body = json_body(&response)?;
        let status = body
            .pointer("/task/status")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::Malformed("no task.status in status response".into()))?;
        task_status(status, &body)
    }

    async fn fetch(&self, task_id: &str, _status: Value) -> Result<Value, RemoteError> {
        let url = format!("{}/tasks/report/{}/json", self.endpoint.base(), task_id);
        let response = remote::send(self.transport.as_ref(), self.request(HttpRequest::get(url))).await?;
        if !response.is_success() {
            return Err(unexpected(&response));
        }
        Ok(summarize(task_id, &json_body(&response)?))
    }
}

#[async_trait]
impl Analyzer for CuckooScan {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        self.ctx.file()?;
        let outcome = self.engine.run(self, &self.ctx.cancel).await?;
        Ok(outcome.payload)
    }
}
