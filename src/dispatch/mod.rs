//! Analyzer dispatch: resolve a job's target, run every requested analyzer
//! concurrently, and fold the reports into a [`JobResult`].
//!
//! Each analyzer runs in its own tokio task under its `AnalyzerSpec` deadline. A
//! panic inside one analyzer is caught at the join boundary and becomes an
//! `InternalError` report; the other analyzers are unaffected. Every
//! requested name yields exactly one report, emitted to the configured
//! [`ReportSink`] as soon as it is final.

pub mod slots;

pub use slots::ReportSlots;

use crate::aggregate::JobResult;
use crate::analyzers::{self, Analyzer, AnalyzerContext, AnalyzerFactory, Services};
use crate::catalog::AnalyzerCatalog;
use crate::config::OrchestratorConfig;
use crate::core::errors::{AnalyzerError, ErrorKind};
use crate::core::job::Job;
use crate::core::params;
use crate::core::report::{Report, ReportClock};
use crate::core::spec::{AnalyzerKind, AnalyzerSpec};
use crate::core::target::Target;
use crate::error::{AncalagonError, Result};
use crate::io::{LocalStorage, Storage};
use crate::resolver::resolve;
use crate::sink::ReportSink;
use crate::timeout::{with_timeout, TimeoutConfig};
use crate::transport::{HttpTransport, Transport};
use crate::{analyzer_span, job_span};
use chrono::Utc;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Runs jobs against a fixed catalogue, storage and transport.
pub struct Dispatcher {
    catalog: Arc<AnalyzerCatalog>,
    storage: Arc<dyn Storage>,
    services: Services,
    factories: HashMap<String, Arc<dyn AnalyzerFactory>>,
    sink: Option<Arc<dyn ReportSink>>,
}

impl Dispatcher {
    /// Validate `config` and bind the collaborators.
    pub fn new(config: OrchestratorConfig, storage: Arc<dyn Storage>, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let catalog = config.catalog()?;
        info!(analyzers = catalog.len(), "Dispatcher ready");
        Ok(Self {
            catalog: Arc::new(catalog),
            storage,
            services: Services {
                transport,
                config: config.services,
            },
            factories: HashMap::new(),
            sink: None,
        })
    }

    /// Dispatcher over `LocalStorage` at `io.media_root` and an `HttpTransport`
    /// bounded by `services.request_timeout_secs`.
    pub fn from_config(config: OrchestratorConfig) -> Result<Self> {
        let storage = Arc::new(LocalStorage::from_config(&config.io));
        let transport = HttpTransport::from_config(&config.services)
            .map_err(|e| AncalagonError::Config(format!("http transport: {}", e)))?;
        Self::new(config, storage, Arc::new(transport))
    }

    /// Register the factory behind `AnalyzerKind::Custom(kind)`.
    pub fn with_factory(mut self, kind: impl Into<String>, factory: Arc<dyn AnalyzerFactory>) -> Self {
        self.factories.insert(kind.into(), factory);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn catalog(&self) -> &AnalyzerCatalog {
        &self.catalog
    }

    /// Resolve, dispatch and aggregate one job.
    pub async fn run_job(&self, job: &Job, cancel: &CancellationToken) -> JobResult {
        let span = job_span!(job.id, target_kind = %job.target_kind());
        async {
            let started_at = Utc::now();
            let names = job.distinct_analyzers();
            info!(analyzers = names.len(), privacy = job.force_privacy, "Job started");

            let reports = match resolve(job, self.storage.as_ref()) {
                Ok(target) => self.dispatch(job, Arc::new(target), &names, cancel).await,
                Err(err) => {
                    warn!(error = %err, "Target resolution failed");
                    names
                        .iter()
                        .map(|name| {
                            let report = Report::rejected(name.clone(), job.id, err.clone());
                            self.emit(&report);
                            report
                        })
                        .collect()
                }
            };

            let result = JobResult::assemble(job.id, reports, started_at);
            info!(
                status = ?result.status,
                succeeded = result.counts.succeeded,
                failed = result.counts.failed,
                skipped = result.counts.skipped,
                "Job finished"
            );
            result
        }
        .instrument(span)
        .await
    }

    /// Run `names` against an already resolved target.
    ///
    /// Returns one report per name, in `names` order. Names must be distinct.
    pub async fn dispatch(
        &self,
        job: &Job,
        target: Arc<Target>,
        names: &[String],
        cancel: &CancellationToken,
    ) -> Vec<Report> {
        let slots = Arc::new(ReportSlots::new());
        let mut supervisors = Vec::with_capacity(names.len());

        for name in names {
            let prepared = self.catalog.get(name).ok_or_else(|| {
                AnalyzerError::invalid_parameters(format!("unknown analyzer '{}'", name))
            });
            let prepared = prepared.and_then(|spec| {
                spec.admit(&target, job.force_privacy)?;
                let params = params::merge(&spec.params, job.runtime_params.get(name));
                let ctx = AnalyzerContext::new(name.clone(), job.id, target.clone(), cancel.child_token())
                    .with_deadline(spec.timeout());
                Ok((spec, self.instantiate(spec, ctx, &params)?))
            });

            match prepared {
                Ok((spec, analyzer)) => {
                    supervisors.push(self.spawn(job.id, spec, analyzer, slots.clone()));
                }
                Err(err) => {
                    if err.kind.is_skip() {
                        debug!(analyzer = %name, reason = %err.detail, "Analyzer skipped");
                    } else {
                        warn!(analyzer = %name, error = %err, "Analyzer rejected");
                    }
                    let report = Report::rejected(name.clone(), job.id, err);
                    self.emit(&report);
                    slots.record(report);
                }
            }
        }

        for supervisor in supervisors {
            if let Err(e) = supervisor.await {
                error!(error = %e, "Report supervisor failed");
            }
        }

        let mut reports = slots.take_ordered(names);
        if reports.len() != names.len() {
            // Every spawned analyzer records through its supervisor; a gap
            // here means a supervisor itself died.
            let present: HashSet<String> = reports.iter().map(|r| r.analyzer_name().to_string()).collect();
            for name in names.iter().filter(|n| !present.contains(*n)) {
                let report = Report::rejected(
                    name.clone(),
                    job.id,
                    AnalyzerError::internal("analyzer finished without a report"),
                );
                self.emit(&report);
                reports.push(report);
            }
            let order: HashMap<&str, usize> = names.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
            reports.sort_by_key(|r| order.get(r.analyzer_name()).copied().unwrap_or(usize::MAX));
        }
        reports
    }

    /// Build the analyzer; a panicking constructor becomes an `InternalError`.
    fn instantiate(
        &self,
        spec: &AnalyzerSpec,
        ctx: AnalyzerContext,
        params: &Map<String, Value>,
    ) -> std::result::Result<Box<dyn Analyzer>, AnalyzerError> {
        let built = panic::catch_unwind(AssertUnwindSafe(|| match &spec.kind {
            AnalyzerKind::Custom(kind) => self
                .factories
                .get(kind)
                .ok_or_else(|| {
                    AnalyzerError::invalid_parameters(format!(
                        "no factory registered for custom analyzer kind '{}'",
                        kind
                    ))
                })?
                .build(ctx, params, &self.services),
            _ => analyzers::build(spec, ctx, params, &self.services),
        }));
        built.unwrap_or_else(|payload| {
            error!(analyzer = %spec.name, "Analyzer constructor panicked");
            Err(AnalyzerError::internal(format!(
                "analyzer constructor panicked: {}",
                panic_message(payload.as_ref())
            )))
        })
    }

    /// Run one analyzer in its own task, plus a supervisor that converts a
    /// panic or abort into a report and records it.
    fn spawn(
        &self,
        job_id: Uuid,
        spec: &AnalyzerSpec,
        analyzer: Box<dyn Analyzer>,
        slots: Arc<ReportSlots>,
    ) -> tokio::task::JoinHandle<()> {
        let name = spec.name.clone();
        let deadline = TimeoutConfig::from_duration(spec.timeout(), name.clone());
        let span = analyzer_span!(job_id, name);

        let task_name = name.clone();
        let task = tokio::spawn(
            async move {
                let clock = ReportClock::start(task_name, job_id);
                let limit = deadline.duration;
                let started = Instant::now();
                match with_timeout(deadline, analyzer.run()).await {
                    // Synchronous inspection cannot be preempted; an overrun is
                    // still reported as a timeout.
                    Ok(_) if started.elapsed() > limit => {
                        warn!(limit_secs = limit.as_secs(), "Analyzer overran its deadline");
                        clock.finish(Err(AnalyzerError::new(
                            ErrorKind::Timeout,
                            format!("analyzer overran its {}s deadline", limit.as_secs()),
                        )))
                    }
                    Ok(report) => report,
                    Err(e) => clock.finish(Err(AnalyzerError::new(ErrorKind::Timeout, e.to_string()))),
                }
            }
            .instrument(span.clone()),
        );

        let sink = self.sink.clone();
        tokio::spawn(
            async move {
                let clock = ReportClock::start(name, job_id);
                let report = match task.await {
                    Ok(report) => report,
                    Err(e) => clock.finish(Err(join_failure(e))),
                };
                if report.success() {
                    info!(process_time = report.process_time(), "Analyzer succeeded");
                } else {
                    warn!(errors = ?report.errors(), "Analyzer failed");
                }
                if let Some(sink) = &sink {
                    if let Err(e) = sink.emit(&report) {
                        error!(error = %e, "Report sink rejected report");
                    }
                }
                slots.record(report);
            }
            .instrument(span),
        )
    }

    fn emit(&self, report: &Report) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.emit(report) {
                error!(analyzer = %report.analyzer_name(), error = %e, "Report sink rejected report");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

fn join_failure(err: JoinError) -> AnalyzerError {
    if err.is_panic() {
        let payload = err.into_panic();
        AnalyzerError::internal(format!("analyzer panicked: {}", panic_message(payload.as_ref())))
    } else {
        AnalyzerError::new(ErrorKind::Cancelled, "analyzer task was aborted")
    }
}
