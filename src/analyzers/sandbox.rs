//! Containerized analysis services (PEframe, Thug) behind a common
//! submit-by-key API.

use super::remote::{self, json_body, unexpected};
use super::{Analyzer, AnalyzerContext, Services};
use crate::config::ServiceEndpoint;
use crate::core::errors::AnalyzerError;
use crate::core::observable::ObservableKind;
use crate::core::target::TargetContent;
use crate::poll::{PollEngine, RemoteError, RemoteJob, RemoteStatus, Submission};
use crate::transport::{HttpRequest, Transport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerParams {
    pub max_tries: u32,
    pub poll_distance: u64,
    pub wait_for_completion: bool,
    /// Browser personality passed to Thug
    pub user_agent: Option<String>,
}

impl Default for ContainerParams {
    fn default() -> Self {
        Self {
            max_tries: 15,
            poll_distance: 5,
            wait_for_completion: true,
            user_agent: None,
        }
    }
}

pub struct ContainerScan {
    ctx: AnalyzerContext,
    tool: &'static str,
    engine: PollEngine,
    transport: Arc<dyn Transport>,
    endpoint: ServiceEndpoint,
    user_agent: Option<String>,
}

impl ContainerScan {
    pub fn peframe(ctx: AnalyzerContext, params: ContainerParams, services: &Services) -> Self {
        let endpoint = services.config.peframe.clone();
        Self::new(ctx, "peframe", endpoint, params, services)
    }

    pub fn thug(ctx: AnalyzerContext, params: ContainerParams, services: &Services) -> Self {
        let endpoint = services.config.thug.clone();
        Self::new(ctx, "thug", endpoint, params, services)
    }

    fn new(
        ctx: AnalyzerContext,
        tool: &'static str,
        endpoint: ServiceEndpoint,
        params: ContainerParams,
        services: &Services,
    ) -> Self {
        let config = remote::poll_config(
            remote::submit_mode(params.wait_for_completion),
            params.max_tries,
            params.poll_distance,
        );
        Self {
            engine: PollEngine::new(ctx.name.clone(), config),
            ctx,
            tool,
            transport: services.transport.clone(),
            endpoint,
            user_agent: params.user_agent,
        }
    }

    fn url(&self) -> String {
        format!("{}/{}", self.endpoint.base(), self.tool)
    }

    fn submission(&self) -> Result<HttpRequest, RemoteError> {
        match self.ctx.target.content() {
            TargetContent::File(file) => {
                let fields = self
                    .user_agent
                    .iter()
                    .map(|ua| ("user_agent".to_string(), ua.clone()))
                    .collect();
                Ok(HttpRequest::post(self.url()).file("file", file.file_name(), file.data().clone(), fields))
            }
            TargetContent::Observable(obs) => {
                let url = match obs.kind {
                    ObservableKind::Url => obs.value.clone(),
                    ObservableKind::Domain => format!("http://{}", obs.value),
                    other => {
                        return Err(RemoteError::Rejected(format!("{} cannot analyze a {}", self.tool, other)));
                    }
                };
                let mut body = Map::new();
                body.insert("url".into(), json!(url));
                if let Some(ua) = &self.user_agent {
                    body.insert("user_agent".into(), json!(ua));
                }
                Ok(HttpRequest::post(self.url()).json(Value::Object(body)))
            }
        }
    }
}

fn job_status(tool: &str, body: &Value) -> Result<RemoteStatus, RemoteError> {
    match body["status"].as_str() {
        Some("running") => Ok(RemoteStatus::Pending),
        Some("success") => Ok(RemoteStatus::Completed(body["report"].clone())),
        Some("failed") => Ok(RemoteStatus::Failed(
            body["error"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} analysis failed", tool)),
        )),
        Some(other) => Err(RemoteError::Malformed(format!("unknown {} status '{}'", tool, other))),
        None => Err(RemoteError::Malformed(format!("no status in {} response", tool))),
    }
}

#[async_trait]
impl RemoteJob for ContainerScan {
    async fn submit(&self) -> Result<Submission, RemoteError> {
        let response = remote::send(self.transport.as_ref(), self.submission()?).await?;
        if !response.is_success() {
            return Err(unexpected(&response));
        }
        json_body(&response)?["key"]
            .as_str()
            .filter(|k| !k.is_empty())
            .map(|k| Submission::Accepted(k.to_string()))
            .ok_or_else(|| RemoteError::Malformed(format!("no key in {} response", self.tool)))
    }

    async fn poll(&self, key: &str) -> Result<RemoteStatus, RemoteError> {
        let request = HttpRequest::get(format!("{}?key={}", self.url(), key));
        let response = remote::send(self.transport.as_ref(), request).await?;
        match response.status {
            404 => Ok(RemoteStatus::Missing(format!("{} job {} not found", self.tool, key))),
            200 => job_status(self.tool, &json_body(&response)?),
            _ => Err(unexpected(&response)),
        }
    }
}

#[async_trait]
impl Analyzer for ContainerScan {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        let outcome = self.engine.run(self, &self.ctx.cancel).await?;
        Ok(outcome.payload)
    }
}
