//! VirusTotal v3: report lookups and file scans.
//!
//! `VT_v3_Get` looks a target up by its identifier; with
//! `force_active_scan` a missing file is uploaded and scanned. `VT_v3_Scan`
//! uploads the file unless a report already exists (or `force_rescan`).

use super::remote::{self, id_field, json_body, require_key, unexpected};
use super::{Analyzer, AnalyzerContext, Services};
use crate::core::errors::{AnalyzerError, ErrorKind};
use crate::core::observable::ObservableKind;
use crate::core::target::TargetContent;
use crate::io::TargetBytes;
use crate::poll::{PollConfig, PollEngine, PollMode, RemoteError, RemoteJob, RemoteStatus, Submission};
use crate::transport::{HttpRequest, Transport};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanParams {
    pub max_tries: u32,
    pub poll_distance: u64,
    /// Upload even when a report already exists
    pub force_rescan: bool,
    pub wait_for_completion: bool,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            max_tries: 10,
            poll_distance: 30,
            force_rescan: false,
            wait_for_completion: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetParams {
    /// Upload and scan files VirusTotal has never seen
    pub force_active_scan: bool,
    pub max_tries: u32,
    pub poll_distance: u64,
    pub wait_for_completion: bool,
}

impl Default for GetParams {
    fn default() -> Self {
        Self {
            force_active_scan: false,
            max_tries: 10,
            poll_distance: 30,
            wait_for_completion: true,
        }
    }
}

/// Authenticated access to the v3 API.
struct VtClient {
    transport: Arc<dyn Transport>,
    base: String,
    key: String,
}

impl VtClient {
    fn new(services: &Services, analyzer: &str) -> Result<Self, AnalyzerError> {
        let endpoint = &services.config.virustotal;
        Ok(Self {
            key: require_key(endpoint, analyzer)?,
            base: endpoint.base().to_string(),
            transport: services.transport.clone(),
        })
    }

    fn get(&self, path: &str) -> HttpRequest {
        HttpRequest::get(format!("{}{}", self.base, path)).header("x-apikey", self.key.clone())
    }

    /// Object report at `path`; 404 means VirusTotal has never seen it.
    async fn lookup(&self, path: &str) -> Result<RemoteStatus, RemoteError> {
        let response = remote::send(self.transport.as_ref(), self.get(path)).await?;
        match response.status {
            404 => Ok(RemoteStatus::Missing(format!("no VirusTotal report for {}", path))),
            200 => Ok(RemoteStatus::Completed(summarize(&json_body(&response)?))),
            _ => Err(unexpected(&response)),
        }
    }
}

/// Lookup path for the job target.
fn lookup_path(ctx: &AnalyzerContext) -> String {
    match ctx.target.content() {
        TargetContent::File(_) => format!("/files/{}", ctx.target.md5()),
        TargetContent::Observable(obs) => match obs.kind {
            ObservableKind::Hash => format!("/files/{}", obs.value),
            // URL identifier: unpadded URL-safe base64 of the URL itself
            ObservableKind::Url => format!("/urls/{}", URL_SAFE_NO_PAD.encode(&obs.value)),
            ObservableKind::Domain => format!("/domains/{}", obs.value),
            ObservableKind::Ip => format!("/ip_addresses/{}", obs.value),
        },
    }
}

fn summarize(body: &Value) -> Value {
    let data = &body["data"];
    let attributes = &data["attributes"];
    json!({
        "id": data["id"],
        "type": data["type"],
        "stats": attributes["last_analysis_stats"],
        "malicious": attributes
            .pointer("/last_analysis_stats/malicious")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        "reputation": attributes["reputation"],
        "tags": attributes["tags"],
        "last_analysis_date": attributes["last_analysis_date"],
    })
}

fn analysis_status(body: &Value) -> Result<RemoteStatus, RemoteError> {
    let status = body
        .pointer("/data/attributes/status")
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::Malformed("no data.attributes.status in analysis".into()))?;
    match status {
        "queued" | "in-progress" => Ok(RemoteStatus::Pending),
        "completed" => Ok(RemoteStatus::Completed(body.clone())),
        other => Err(RemoteError::Malformed(format!("unknown analysis status '{}'", other))),
    }
}

/// Upload one file and follow its analysis.
struct FileScan<'a> {
    client: &'a VtClient,
    file: &'a TargetBytes,
    md5: &'a str,
    /// Skip the existing-report check
    force_rescan: bool,
}

#[async_trait]
impl<'a> RemoteJob for FileScan<'a> {
    async fn submit(&self) -> Result<Submission, RemoteError> {
        if !self.force_rescan {
            if let RemoteStatus::Completed(report) = self.client.lookup(&format!("/files/{}", self.md5)).await? {
                return Ok(Submission::AlreadyAnalyzed(report));
            }
        }

        let request = HttpRequest::post(format!("{}/files", self.client.base))
            .header("x-apikey", self.client.key.clone())
            .file("file", self.file.file_name(), self.file.data().clone(), Vec::new());
        let response = remote::send(self.client.transport.as_ref(), request).await?;
        if !response.is_success() {
            return Err(unexpected(&response));
        }
        let body = json_body(&response)?;
        id_field(&body["data"]["id"])
            .map(Submission::Accepted)
            .ok_or_else(|| RemoteError::Malformed("no data.id in upload response".into()))
    }

    async fn poll(&self, analysis_id: &str) -> Result<RemoteStatus, RemoteError> {
        let path = format!("/analyses/{}", analysis_id);
        let response = remote::send(self.client.transport.as_ref(), self.client.get(&path)).await?;
        match response.status {
            404 => Ok(RemoteStatus::Missing(format!("analysis {} not found", analysis_id))),
            200 => analysis_status(&json_body(&response)?),
            _ => Err(unexpected(&response)),
        }
    }

    async fn fetch(&self, _analysis_id: &str, _status: Value) -> Result<Value, RemoteError> {
        match self.client.lookup(&format!("/files/{}", self.md5)).await? {
            RemoteStatus::Completed(report) => Ok(report),
            _ => Err(RemoteError::Malformed("file report unavailable after analysis".into())),
        }
    }
}

/// Report lookup by identifier; there is nothing to submit.
struct Lookup<'a> {
    client: &'a VtClient,
}

#[async_trait]
impl<'a> RemoteJob for Lookup<'a> {
    async fn submit(&self) -> Result<Submission, RemoteError> {
        Err(RemoteError::Rejected("lookups are never submitted".into()))
    }

    async fn poll(&self, path: &str) -> Result<RemoteStatus, RemoteError> {
        self.client.lookup(path).await
    }
}

fn scan_config(max_tries: u32, poll_distance: u64, wait_for_completion: bool) -> PollConfig {
    remote::poll_config(remote::submit_mode(wait_for_completion), max_tries, poll_distance)
}

pub struct VirusTotalScan {
    ctx: AnalyzerContext,
    client: VtClient,
    engine: PollEngine,
    force_rescan: bool,
}

impl VirusTotalScan {
    pub fn new(ctx: AnalyzerContext, params: ScanParams, services: &Services) -> Result<Self, AnalyzerError> {
        let client = VtClient::new(services, &ctx.name)?;
        let engine = PollEngine::new(
            ctx.name.clone(),
            scan_config(params.max_tries, params.poll_distance, params.wait_for_completion),
        );
        Ok(Self {
            ctx,
            client,
            engine,
            force_rescan: params.force_rescan,
        })
    }
}

#[async_trait]
impl Analyzer for VirusTotalScan {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        let job = FileScan {
            client: &self.client,
            file: self.ctx.file()?,
            md5: self.ctx.target.md5(),
            force_rescan: self.force_rescan,
        };
        let outcome = self.engine.run(&job, &self.ctx.cancel).await?;
        let mut payload = outcome.payload;
        payload["already_analyzed"] = json!(outcome.already_analyzed);
        Ok(payload)
    }
}

pub struct VirusTotalGet {
    ctx: AnalyzerContext,
    client: VtClient,
    params: GetParams,
}

impl VirusTotalGet {
    pub fn new(ctx: AnalyzerContext, params: GetParams, services: &Services) -> Result<Self, AnalyzerError> {
        Ok(Self {
            client: VtClient::new(services, &ctx.name)?,
            ctx,
            params,
        })
    }
}

#[async_trait]
impl Analyzer for VirusTotalGet {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        let path = lookup_path(&self.ctx);
        let lookup = PollEngine::new(
            self.ctx.name.clone(),
            PollConfig::new(PollMode::LookupOnly(path)).with_poll(1, Duration::ZERO),
        );
        let missing = match lookup.run(&Lookup { client: &self.client }, &self.ctx.cancel).await {
            Ok(outcome) => {
                let mut payload = outcome.payload;
                payload["scanned"] = json!(false);
                return Ok(payload);
            }
            Err(err) if err.kind == ErrorKind::RemoteMissing => err,
            Err(err) => return Err(err),
        };

        let file = match (self.params.force_active_scan, self.ctx.target.bytes()) {
            (true, Some(file)) => file,
            _ => return Err(missing),
        };
        info!(analyzer = %self.ctx.name, "Unknown to VirusTotal, submitting for scan");
        let scan = PollEngine::new(
            self.ctx.name.clone(),
            scan_config(self.params.max_tries, self.params.poll_distance, self.params.wait_for_completion),
        );
        let job = FileScan {
            client: &self.client,
            file,
            md5: self.ctx.target.md5(),
            force_rescan: true,
        };
        let mut payload = scan.run(&job, &self.ctx.cancel).await?.payload;
        payload["scanned"] = json!(true);
        Ok(payload)
    }
}
