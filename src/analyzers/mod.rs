//! Analyzer contract and the built-in analyzer implementations.
//!
//! Every analyzer is constructed with an [`AnalyzerContext`] (name, job id,
//! shared target, cancellation token) and a parameter bag merged from its
//! `AnalyzerSpec` defaults and the job's overrides. Parameters are decoded at
//! construction, so ill-typed parameters fail before any external call.
//!
//! [`Analyzer::run`] never fails: every outcome, including errors, is sealed
//! into a [`Report`].

pub mod cuckoo;
pub mod doc_info;
pub mod file_info;
pub mod intezer;
pub mod pdf_info;
pub mod pe_info;
pub mod remote;
pub mod rtf_info;
pub mod sandbox;
pub mod signature_info;
pub mod strings_info;
pub mod virustotal;
pub mod yara_scan;

use crate::config::ServicesConfig;
use crate::core::errors::AnalyzerError;
use crate::core::params;
use crate::core::report::{Report, ReportClock};
use crate::core::spec::{AnalyzerKind, AnalyzerSpec};
use crate::core::target::Target;
use crate::io::TargetBytes;
use crate::timeout::StepGuard;
use crate::transport::Transport;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Everything an analyzer instance is bound to.
#[derive(Debug, Clone)]
pub struct AnalyzerContext {
    pub name: String,
    pub job_id: Uuid,
    pub target: Arc<Target>,
    pub cancel: CancellationToken,
    /// Wall-time budget for cooperative local inspection
    pub deadline: Option<Duration>,
}

impl AnalyzerContext {
    pub fn new(name: impl Into<String>, job_id: Uuid, target: Arc<Target>, cancel: CancellationToken) -> Self {
        Self {
            name: name.into(),
            job_id,
            target,
            cancel,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Guard for chunked local inspection, bound to the job's cancellation
    /// and this analyzer's deadline.
    pub fn step_guard(&self) -> StepGuard {
        let guard = StepGuard::new(self.cancel.clone(), self.name.clone());
        match self.deadline {
            Some(deadline) => guard.with_max_duration(deadline),
            None => guard,
        }
    }

    /// File bytes, or `NotApplicable` for observable targets.
    pub fn file(&self) -> Result<&TargetBytes, AnalyzerError> {
        self.target
            .bytes()
            .ok_or_else(|| AnalyzerError::not_applicable(format!("{} requires a file target", self.name)))
    }
}

/// One unit of work producing exactly one report.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn context(&self) -> &AnalyzerContext;

    /// Analyzer-specific work; errors become the report's failure reason.
    async fn analyze(&self) -> Result<Value, AnalyzerError>;

    fn name(&self) -> &str {
        &self.context().name
    }

    /// Run to completion and seal the outcome.
    async fn run(&self) -> Report {
        let ctx = self.context();
        let clock = ReportClock::start(ctx.name.clone(), ctx.job_id);
        let outcome = self.analyze().await;
        clock.finish(outcome)
    }
}

/// Shared collaborators for remote analyzers.
#[derive(Clone)]
pub struct Services {
    pub transport: Arc<dyn Transport>,
    pub config: ServicesConfig,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builds analyzers of a custom kind registered on the dispatcher.
pub trait AnalyzerFactory: Send + Sync {
    fn build(
        &self,
        ctx: AnalyzerContext,
        params: &Map<String, Value>,
        services: &Services,
    ) -> Result<Box<dyn Analyzer>, AnalyzerError>;
}

/// Instantiate a built-in analyzer.
///
/// Custom kinds are resolved by the dispatcher's factory registry and are
/// reported here as unknown.
pub fn build(
    spec: &AnalyzerSpec,
    ctx: AnalyzerContext,
    params: &Map<String, Value>,
    services: &Services,
) -> Result<Box<dyn Analyzer>, AnalyzerError> {
    let name = spec.name.as_str();
    let analyzer: Box<dyn Analyzer> = match &spec.kind {
        AnalyzerKind::FileInfo => Box::new(file_info::FileInfo::new(ctx)),
        AnalyzerKind::StringsInfo => Box::new(strings_info::StringsInfo::new(ctx, params::decode(name, params)?)),
        AnalyzerKind::PeInfo => Box::new(pe_info::PeInfo::new(ctx, params::decode(name, params)?)),
        AnalyzerKind::SignatureInfo => Box::new(signature_info::SignatureInfo::new(ctx)),
        AnalyzerKind::YaraScan => Box::new(yara_scan::YaraScan::new(ctx, params::decode(name, params)?)?),
        AnalyzerKind::PdfInfo => Box::new(pdf_info::PdfInfo::new(ctx)),
        AnalyzerKind::RtfInfo => Box::new(rtf_info::RtfInfo::new(ctx)),
        AnalyzerKind::DocInfo => Box::new(doc_info::DocInfo::new(ctx)),
        AnalyzerKind::CuckooScan => Box::new(cuckoo::CuckooScan::new(ctx, params::decode(name, params)?, services)),
        AnalyzerKind::VirusTotalScan => {
            Box::new(virustotal::VirusTotalScan::new(ctx, params::decode(name, params)?, services)?)
        }
        AnalyzerKind::VirusTotalGet => {
            Box::new(virustotal::VirusTotalGet::new(ctx, params::decode(name, params)?, services)?)
        }
        AnalyzerKind::IntezerScan => Box::new(intezer::IntezerScan::new(ctx, params::decode(name, params)?, services)?),
        AnalyzerKind::Peframe => Box::new(sandbox::ContainerScan::peframe(ctx, params::decode(name, params)?, services)),
        AnalyzerKind::Thug => Box::new(sandbox::ContainerScan::thug(ctx, params::decode(name, params)?, services)),
        AnalyzerKind::Custom(key) => {
            return Err(AnalyzerError::invalid_parameters(format!(
                "no factory registered for custom analyzer kind '{}'",
                key
            )))
        }
    };
    Ok(analyzer)
}

/// Type-check an `AnalyzerSpec`'s default parameters without building an analyzer.
pub fn check_params(spec: &AnalyzerSpec) -> Result<(), AnalyzerError> {
    let name = spec.name.as_str();
    let p = &spec.params;
    match &spec.kind {
        AnalyzerKind::FileInfo
        | AnalyzerKind::PdfInfo
        | AnalyzerKind::RtfInfo
        | AnalyzerKind::DocInfo
        | AnalyzerKind::SignatureInfo
        | AnalyzerKind::Custom(_) => Ok(()),
        AnalyzerKind::StringsInfo => params::decode::<crate::strings::StringsConfig>(name, p).map(drop),
        AnalyzerKind::PeInfo => params::decode::<pe_info::PeInfoParams>(name, p).map(drop),
        AnalyzerKind::YaraScan => params::decode::<yara_scan::YaraParams>(name, p).map(drop),
        AnalyzerKind::CuckooScan => params::decode::<cuckoo::CuckooParams>(name, p).map(drop),
        AnalyzerKind::VirusTotalScan => params::decode::<virustotal::ScanParams>(name, p).map(drop),
        AnalyzerKind::VirusTotalGet => params::decode::<virustotal::GetParams>(name, p).map(drop),
        AnalyzerKind::IntezerScan => params::decode::<intezer::IntezerParams>(name, p).map(drop),
        AnalyzerKind::Peframe | AnalyzerKind::Thug => params::decode::<sandbox::ContainerParams>(name, p).map(drop),
    }
}
