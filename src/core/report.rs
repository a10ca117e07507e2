//! Normalized per-analyzer report.

use crate::core::errors::{AnalyzerError, ErrorKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

/// Outcome of exactly one analyzer run for one job.
///
/// Reports are only built through [`ReportClock::finish`] or
/// [`Report::rejected`], which keeps `success` and `errors` consistent:
/// a successful report has no errors, a failed one has at least one.
/// Fields are read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    analyzer_name: String,
    job_id: Uuid,
    success: bool,
    report: Value,
    errors: Vec<String>,
    error_kind: Option<ErrorKind>,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    /// Wall time of the run in seconds
    process_time: f64,
}

impl Report {
    /// Failure report for an analyzer that never ran (unknown name,
    /// inapplicable target, unresolvable target).
    pub fn rejected(analyzer_name: impl Into<String>, job_id: Uuid, error: AnalyzerError) -> Self {
        ReportClock::start(analyzer_name, job_id).finish(Err(error))
    }

    pub fn analyzer_name(&self) -> &str {
        &self.analyzer_name
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// Analyzer-specific payload; `Null` on failure.
    pub fn payload(&self) -> &Value {
        &self.report
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    /// True when the analyzer was skipped as inapplicable.
    pub fn skipped(&self) -> bool {
        self.error_kind.is_some_and(|k| k.is_skip())
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    pub fn process_time(&self) -> f64 {
        self.process_time
    }
}

/// Captures the start of a run and seals its report.
#[derive(Debug, Clone)]
pub struct ReportClock {
    analyzer_name: String,
    job_id: Uuid,
    started_at: DateTime<Utc>,
    start: Instant,
}

impl ReportClock {
    pub fn start(analyzer_name: impl Into<String>, job_id: Uuid) -> Self {
        Self {
            analyzer_name: analyzer_name.into(),
            job_id,
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    pub fn analyzer_name(&self) -> &str {
        &self.analyzer_name
    }

    /// Seal the run outcome into a report.
    pub fn finish(self, outcome: Result<Value, AnalyzerError>) -> Report {
        let process_time = (self.start.elapsed().as_secs_f64() * 100.0).round() / 100.0;
        let (success, report, errors, error_kind) = match outcome {
            Ok(payload) => (true, payload, Vec::new(), None),
            Err(err) => (false, Value::Null, vec![err.to_string()], Some(err.kind)),
        };
        Report {
            analyzer_name: self.analyzer_name,
            job_id: self.job_id,
            success,
            report,
            errors,
            error_kind,
            started_at: self.started_at,
            ended_at: Utc::now(),
            process_time,
        }
    }
}
