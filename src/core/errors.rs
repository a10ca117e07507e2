//! Error taxonomy for analyzer runs.
//!
//! Every failure an analyzer can meet is reduced to an [`ErrorKind`] plus a
//! human readable detail. Kinds never propagate past the analyzer boundary;
//! they surface only in the analyzer's report.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standardized failure kinds recorded in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The referenced file could not be read
    TargetUnavailable,
    /// The observable failed format or classification validation
    InvalidObservable,
    /// Unknown analyzer or parameters that fail validation
    InvalidParameters,
    /// The analyzer does not accept this target, or privacy forbids it
    NotApplicable,
    /// Submission failed past the retry budget
    SubmitExhausted,
    /// The remote service reported an analysis failure
    RemoteFailure,
    /// The remote service lost or expired the submission
    RemoteMissing,
    /// Local poll budget exhausted; the remote may still be working
    PollExhausted,
    /// The analyzer's own deadline elapsed
    Timeout,
    /// The job was cancelled before a terminal state
    Cancelled,
    /// A local analyzer could not interpret the target
    AnalysisFailed,
    /// A defect inside analyzer logic, caught at the dispatch boundary
    InternalError,
}

impl ErrorKind {
    /// Inapplicable analyzers are counted as skipped, not failed.
    pub fn is_skip(&self) -> bool {
        matches!(self, ErrorKind::NotApplicable)
    }

    pub fn as_str(&self) -> &'static str {
        use ErrorKind::*;
        match self {
            TargetUnavailable => "TargetUnavailable",
            InvalidObservable => "InvalidObservable",
            InvalidParameters => "InvalidParameters",
            NotApplicable => "NotApplicable",
            SubmitExhausted => "SubmitExhausted",
            RemoteFailure => "RemoteFailure",
            RemoteMissing => "RemoteMissing",
            PollExhausted => "PollExhausted",
            Timeout => "Timeout",
            Cancelled => "Cancelled",
            AnalysisFailed => "AnalysisFailed",
            InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one analyzer run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct AnalyzerError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl AnalyzerError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid_parameters(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameters, detail)
    }

    pub fn analysis_failed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::AnalysisFailed, detail)
    }

    pub fn not_applicable(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotApplicable, detail)
    }

    pub fn remote_failure(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteFailure, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, detail)
    }
}
