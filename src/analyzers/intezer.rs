//! Intezer_Scan: genetic code analysis of PE files.

use super::remote::{self, json_body, require_key, unexpected};
use super::{Analyzer, AnalyzerContext, Services};
use crate::core::errors::AnalyzerError;
use crate::poll::{PollEngine, RemoteError, RemoteJob, RemoteStatus, Submission};
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntezerParams {
    pub max_tries: u32,
    pub poll_distance: u64,
    pub wait_for_completion: bool,
}

impl Default for IntezerParams {
    fn default() -> Self {
        Self {
            max_tries: 200,
            poll_distance: 3,
            wait_for_completion: true,
        }
    }
}

pub struct IntezerScan {
    ctx: AnalyzerContext,
    engine: PollEngine,
    transport: Arc<dyn Transport>,
    base: String,
    api_key: String,
    /// Bearer token, fetched on first use and dropped when rejected
    token: Mutex<Option<String>>,
}

impl IntezerScan {
    pub fn new(ctx: AnalyzerContext, params: IntezerParams, services: &Services) -> Result<Self, AnalyzerError> {
        let endpoint = &services.config.intezer;
        let api_key = require_key(endpoint, &ctx.name)?;
        let config = remote::poll_config(
            remote::submit_mode(params.wait_for_completion),
            params.max_tries,
            params.poll_distance,
        );
        Ok(Self {
            engine: PollEngine::new(ctx.name.clone(), config),
            ctx,
            transport: services.transport.clone(),
            base: endpoint.base().to_string(),
            api_key,
            token: Mutex::new(None),
        })
    }

    fn cached_token(&self) -> Option<String> {
        self.token.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn token(&self) -> Result<String, RemoteError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }
        let request = HttpRequest::post(format!("{}/get-access-token", self.base)).json(json!({"api_key": self.api_key}));
        let response = remote::send(self.transport.as_ref(), request).await?;
        if !response.is_success() {
            return Err(unexpected(&response));
        }
        let token = json_body(&response)?["result"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Malformed("no result in access token response".into()))?;
        debug!(analyzer = %self.ctx.name, "Obtained Intezer access token");
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
        Ok(token)
    }

    /// Send with the bearer token; an expired token is dropped and the call
    /// reported as a retryable failure.
    async fn authorized(&self, request: HttpRequest) -> Result<HttpResponse, RemoteError> {
        let url = request.url.clone();
        let token = self.token().await?;
        let response = remote::send(
            self.transport.as_ref(),
            request.header("Authorization", format!("Bearer {}", token)),
        )
        .await?;
        if response.status == 401 {
            *self.token.lock().unwrap_or_else(|e| e.into_inner()) = None;
            return Err(RemoteError::Transport(TransportError::Status { status: 401, url }));
        }
        Ok(response)
    }

    fn result_url(&self, body: &Value) -> Result<String, RemoteError> {
        body["result_url"]
            .as_str()
            .filter(|u| !u.is_empty())
            .map(|u| format!("{}{}", self.base, u))
            .ok_or_else(|| RemoteError::Malformed("no result_url in analyze response".into()))
    }
}

fn summarize(body: &Value) -> Value {
    let result = &body["result"];
    json!({
        "analysis_id": result["analysis_id"],
        "sha256": result["sha256"],
        "verdict": result["verdict"],
        "sub_verdict": result["sub_verdict"],
        "family_name": result["family_name"],
        "analysis_url": result["analysis_url"],
    })
}

fn analysis_status(body: &Value) -> Result<RemoteStatus, RemoteError> {
    match body["status"].as_str() {
        Some("succeeded") => Ok(RemoteStatus::Completed(summarize(body))),
        Some("failed") => Ok(RemoteStatus::Failed(
            body["error"].as_str().unwrap_or("intezer analysis failed").to_string(),
        )),
        Some("queued") | Some("in_progress") => Ok(RemoteStatus::Pending),
        Some(other) => Err(RemoteError::Malformed(format!("unknown analysis status '{}'", other))),
        None => Err(RemoteError::Malformed("no status in analysis response".into())),
    }
}

#[async_trait]
impl RemoteJob for IntezerScan {
    async fn submit(&self) -> Result<Submission, RemoteError> {
        let file = self.ctx.file().map_err(|e| RemoteError::Rejected(e.detail))?;
        let request = HttpRequest::post(format!("{}/analyze", self.base)).file(
            "file",
            file.file_name(),
            file.data().clone(),
            Vec::new(),
        );
        let response = self.authorized(request).await?;
        match response.status {
            201 => self.result_url(&json_body(&response)?).map(Submission::Accepted),
            409 => {
                let url = self.result_url(&json_body(&response)?)?;
                let existing = self.authorized(HttpRequest::get(url.clone())).await?;
                if existing.status != 200 {
                    return Err(unexpected(&existing));
                }
                // A running or failed earlier analysis is followed like a fresh one.
                match analysis_status(&json_body(&existing)?)? {
                    RemoteStatus::Completed(payload) => Ok(Submission::AlreadyAnalyzed(payload)),
                    _ => Ok(Submission::Accepted(url)),
                }
            }
            _ => Err(unexpected(&response)),
        }
    }

    async fn poll(&self, result_url: &str) -> Result<RemoteStatus, RemoteError> {
        let response = self.authorized(HttpRequest::get(result_url)).await?;
        match response.status {
            202 => Ok(RemoteStatus::Pending),
            200 => analysis_status(&json_body(&response)?),
            404 => Ok(RemoteStatus::Missing(format!("{} not found", result_url))),
            _ => Err(unexpected(&response)),
        }
    }
}

#[async_trait]
impl Analyzer for IntezerScan {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        self.ctx.file()?;
        let outcome = self.engine.run(self, &self.ctx.cancel).await?;
        Ok(outcome.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServiceEndpoint, ServicesConfig};
    use crate::core::errors::ErrorKind;
    use crate::core::target::Target;
    use crate::io::TargetBytes;
    use crate::transport::{Method, ScriptedTransport};
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    const BASE: &str = "https://intezer.test/api/v2-0";

    fn analyzer(transport: Arc<ScriptedTransport>) -> IntezerScan {
        let data: &[u8] = b"MZ\x90\x00 sample";
        let target = Target::file(
            TargetBytes::from_bytes("sample.dll", data),
            crate::hashing::md5_digest(data),
            "application/x-dosexec".into(),
        );
        let ctx = AnalyzerContext::new("Intezer_Scan", Uuid::new_v4(), Arc::new(target), CancellationToken::new());
        let services = Services {
            transport,
            config: ServicesConfig {
                intezer: ServiceEndpoint::new(BASE).with_key("intezer-key"),
                ..ServicesConfig::default()
            },
        };
        IntezerScan::new(ctx, IntezerParams::default(), &services).unwrap()
    }

    fn token_route(t: &ScriptedTransport) {
        t.on_json(Method::Post, &format!("{}/get-access-token", BASE), 200, [json!({"result": "tok"})]);
    }

    fn succeeded() -> Value {
        json!({"status": "succeeded", "result": {
            "analysis_id": "a-1", "sha256": "ff", "verdict": "malicious", "family_name": "Emotet"
        }})
    }

    #[tokio::test(start_paused = true)]
    async fn submit_and_poll() {
        let t = Arc::new(ScriptedTransport::new());
        token_route(&t);
        t.on_json(Method::Post, &format!("{}/analyze", BASE), 201, [json!({"result_url": "/analyses/a-1"})]);
        t.on(
            Method::Get,
            &format!("{}/analyses/a-1", BASE),
            [HttpResponse::new(202, "{}"), HttpResponse::json_body(200, &succeeded())],
        );

        let report = analyzer(t.clone()).run().await;
        assert!(report.success(), "{:?}", report.errors());
        assert_eq!(report.payload()["family_name"], "Emotet");
        // one token for the whole run
        assert_eq!(t.count(Method::Post, &format!("{}/get-access-token", BASE)), 1);
        let poll = t.calls().into_iter().find(|c| c.method == Method::Get).unwrap();
        assert!(poll.headers.contains(&("Authorization".to_string(), "Bearer tok".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn conflict_means_already_analyzed() {
        let t = Arc::new(ScriptedTransport::new());
        token_route(&t);
        t.on_json(Method::Post, &format!("{}/analyze", BASE), 409, [json!({"result_url": "/analyses/old"})]);
        t.on_json(Method::Get, &format!("{}/analyses/old", BASE), 200, [succeeded()]);

        let report = analyzer(t.clone()).run().await;
        assert!(report.success());
        assert_eq!(report.payload()["verdict"], "malicious");
        assert_eq!(t.count(Method::Get, BASE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn conflict_with_running_analysis_is_polled() {
        let t = Arc::new(ScriptedTransport::new());
        token_route(&t);
        t.on_json(Method::Post, &format!("{}/analyze", BASE), 409, [json!({"result_url": "/analyses/running"})]);
        t.on_json(
            Method::Get,
            &format!("{}/analyses/running", BASE),
            200,
            [json!({"status": "in_progress"}), json!({"status": "queued"}), succeeded()],
        );

        let report = analyzer(t.clone()).run().await;
        assert!(report.success(), "{:?}", report.errors());
        assert_eq!(report.payload()["family_name"], "Emotet");
        // one lookup during submission, then polls until the verdict
        assert_eq!(t.count(Method::Get, &format!("{}/analyses/running", BASE)), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_analysis() {
        let t = Arc::new(ScriptedTransport::new());
        token_route(&t);
        t.on_json(Method::Post, &format!("{}/analyze", BASE), 201, [json!({"result_url": "/analyses/a-2"})]);
        t.on_json(Method::Get, BASE, 200, [json!({"status": "failed", "error": "unsupported file"})]);

        let report = analyzer(t).run().await;
        assert_eq!(report.error_kind(), Some(ErrorKind::RemoteFailure));
        assert_eq!(report.errors()[0], "RemoteFailure: unsupported file");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_token_is_refreshed() {
        let t = Arc::new(ScriptedTransport::new());
        token_route(&t);
        t.on_json(Method::Post, &format!("{}/analyze", BASE), 201, [json!({"result_url": "/analyses/a-3"})]);
        t.on(
            Method::Get,
            BASE,
            [HttpResponse::new(401, "expired"), HttpResponse::json_body(200, &succeeded())],
        );

        let report = analyzer(t.clone()).run().await;
        assert!(report.success(), "{:?}", report.errors());
        assert_eq!(t.count(Method::Post, &format!("{}/get-access-token", BASE)), 2);
    }
}
