//! Report aggregation: fold per-analyzer reports into the job's final state.

use crate::core::errors::ErrorKind;
use crate::core::report::Report;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Output schema version for stability tracking
pub const SCHEMA_VERSION: &str = "1.0";

/// Terminal state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// No analyzer failed (skipped analyzers do not count as failures)
    ReportedWithoutFails,
    /// Some analyzers succeeded, some failed
    ReportedWithFails,
    /// Analyzers ran and none succeeded
    Failed,
    /// The job was cancelled before every analyzer finished
    Killed,
}

/// Bookkeeping over one job's reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Inapplicable analyzers (target kind, mimetype or privacy)
    pub skipped: usize,
}

impl ReportCounts {
    pub fn tally<'a>(reports: impl IntoIterator<Item = &'a Report>) -> Self {
        let mut counts = Self::default();
        for report in reports {
            counts.requested += 1;
            if report.success() {
                counts.succeeded += 1;
            } else if report.skipped() {
                counts.skipped += 1;
            } else {
                counts.failed += 1;
            }
        }
        counts
    }
}

/// Aggregate result of one job.
///
/// Reports are held in the order the analyzers were requested; each name
/// appears exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub schema_version: String,
    pub job_id: Uuid,
    pub status: JobStatus,
    pub counts: ReportCounts,
    pub reports: Vec<Report>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl JobResult {
    pub fn assemble(job_id: Uuid, reports: Vec<Report>, started_at: DateTime<Utc>) -> Self {
        let counts = ReportCounts::tally(&reports);
        let cancelled = reports
            .iter()
            .any(|r| r.error_kind() == Some(ErrorKind::Cancelled));
        let status = if cancelled {
            JobStatus::Killed
        } else if counts.failed == 0 {
            JobStatus::ReportedWithoutFails
        } else if counts.succeeded == 0 {
            JobStatus::Failed
        } else {
            JobStatus::ReportedWithFails
        };

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            job_id,
            status,
            counts,
            reports,
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// The report for one analyzer name.
    pub fn report(&self, analyzer: &str) -> Option<&Report> {
        self.reports.iter().find(|r| r.analyzer_name() == analyzer)
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::ReportedWithoutFails
    }

    /// Names of analyzers that failed, in request order.
    pub fn failed_analyzers(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| !r.success() && !r.skipped())
            .map(Report::analyzer_name)
            .collect()
    }
}
