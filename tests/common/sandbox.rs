//! `SandboxScan`: a remote analyzer against a scripted sandbox service.
//!
//! Protocol: `POST {SANDBOX_URL}/submit` returns `{"id"}`;
//! `GET {SANDBOX_URL}/status/{id}` returns `{"status"}` with
//! `pending`, `completed` (payload under `result`), `failed` or `expired`.

use ancalagon::analyzers::remote::{self, json_body, unexpected};
use ancalagon::analyzers::{Analyzer, AnalyzerContext, AnalyzerFactory, Services};
use ancalagon::core::params;
use ancalagon::poll::{PollConfig, PollEngine, PollMode, RemoteError, RemoteJob, RemoteStatus, Submission};
use ancalagon::transport::{HttpRequest, Method, ScriptedTransport, Transport};
use ancalagon::AnalyzerError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

pub const SANDBOX_URL: &str = "http://sandbox.test";

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SandboxParams {
    max_polls: u32,
    poll_interval: u64,
    wait_for_completion: bool,
}

impl Default for SandboxParams {
    fn default() -> Self {
        Self {
            max_polls: 3,
            poll_interval: 10,
            wait_for_completion: true,
        }
    }
}

pub struct SandboxScan {
    ctx: AnalyzerContext,
    engine: PollEngine,
    transport: Arc<dyn Transport>,
}

#[async_trait]
impl RemoteJob for SandboxScan {
    async fn submit(&self) -> Result<Submission, RemoteError> {
        let file = self.ctx.file().map_err(|e| RemoteError::Rejected(e.detail))?;
        let request = HttpRequest::post(format!("{}/submit", SANDBOX_URL)).file(
            "file",
            file.file_name(),
            file.data().clone(),
            Vec::new(),
        );
        let response = remote::send(self.transport.as_ref(), request).await?;
        if !response.is_success() {
            return Err(unexpected(&response));
        }
        json_body(&response)?["id"]
            .as_str()
            .map(|id| Submission::Accepted(id.to_string()))
            .ok_or_else(|| RemoteError::Malformed("no id".into()))
    }

    async fn poll(&self, id: &str) -> Result<RemoteStatus, RemoteError> {
        let request = HttpRequest::get(format!("{}/status/{}", SANDBOX_URL, id));
        let response = remote::send(self.transport.as_ref(), request).await?;
        let body = json_body(&response)?;
        match body["status"].as_str() {
            Some("pending") => Ok(RemoteStatus::Pending),
            Some("completed") => Ok(RemoteStatus::Completed(body["result"].clone())),
            Some("failed") => Ok(RemoteStatus::Failed("sandbox reported failure".into())),
            Some("expired") => Ok(RemoteStatus::Missing("sandbox lost the task".into())),
            _ => Err(RemoteError::Malformed(body.to_string())),
        }
    }
}

#[async_trait]
impl Analyzer for SandboxScan {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        Ok(self.engine.run(self, &self.ctx.cancel).await?.payload)
    }
}

pub struct SandboxFactory;

impl AnalyzerFactory for SandboxFactory {
    fn build(
        &self,
        ctx: AnalyzerContext,
        params: &Map<String, Value>,
        services: &Services,
    ) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        let p: SandboxParams = params::decode(&ctx.name, params)?;
        let mode = if p.wait_for_completion {
            PollMode::SubmitAndWait
        } else {
            PollMode::SubmitOnly
        };
        let config = PollConfig::new(mode)
            .with_submit(2, Duration::from_secs(1))
            .with_poll(p.max_polls, Duration::from_secs(p.poll_interval));
        Ok(Box::new(SandboxScan {
            engine: PollEngine::new(ctx.name.clone(), config),
            ctx,
            transport: services.transport.clone(),
        }))
    }
}

/// Script one submission and the given status sequence.
pub fn script_sandbox(transport: &ScriptedTransport, statuses: &[&str]) {
    transport.on_json(Method::Post, &format!("{}/submit", SANDBOX_URL), 200, [json!({"id": "t-1"})]);
    transport.on_json(
        Method::Get,
        &format!("{}/status/t-1", SANDBOX_URL),
        200,
        statuses.iter().map(|s| {
            if *s == "completed" {
                json!({"status": "completed", "result": {"verdict": "malicious", "score": 9}})
            } else {
                json!({"status": s})
            }
        }),
    );
}

/// Status calls received so far.
pub fn status_calls(transport: &ScriptedTransport) -> usize {
    transport.count(Method::Get, &format!("{}/status/", SANDBOX_URL))
}
