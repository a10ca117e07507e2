//! Submit/poll/retry state machine shared by remote analyzers.
//!
//! A remote analyzer describes its service as a [`RemoteJob`]: how to
//! submit, how to map a status response to a [`RemoteStatus`], and how to
//! fetch the final payload. The [`PollEngine`] owns everything else:
//! attempt budgets, fixed delays, the deadline and cancellation.
//!
//! ```text
//! Submitting --ok--> Polling --completed--> Done
//!     |                 |  \--failed/missing--> Failed(RemoteFailure|RemoteMissing)
//!     |                 \--budget spent--> Failed(PollExhausted)
//!     \--retries spent--> Failed(SubmitExhausted)
//! ```
//!
//! Cancellation is observed at every boundary: before each outbound call and
//! during every delay.

pub mod state;

pub use state::{ObservedStatus, PollConfig, PollMode, PollOutcome, PollState};

use crate::core::errors::{AnalyzerError, ErrorKind};
use crate::transport::TransportError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a submission call.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Accepted; poll with this identifier
    Accepted(String),
    /// The service already holds a result for this target
    AlreadyAnalyzed(Value),
}

/// A status response mapped into the engine's vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteStatus {
    Pending,
    Completed(Value),
    Failed(String),
    Missing(String),
}

/// Failure of one remote call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    /// No usable response; retried only when [`TransportError::is_transient`]
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A response arrived but could not be interpreted
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The service refused the request (bad key, quota, bad input)
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Service-specific half of a remote analyzer.
#[async_trait]
pub trait RemoteJob: Send + Sync {
    async fn submit(&self) -> Result<Submission, RemoteError>;

    async fn poll(&self, submission_id: &str) -> Result<RemoteStatus, RemoteError>;

    /// Turn a completed status into the final payload.
    async fn fetch(&self, _submission_id: &str, status_payload: Value) -> Result<Value, RemoteError> {
        Ok(status_payload)
    }
}

/// Drives one [`RemoteJob`] to a terminal state.
#[derive(Debug, Clone)]
pub struct PollEngine {
    name: String,
    config: PollConfig,
}

impl PollEngine {
    pub fn new(name: impl Into<String>, config: PollConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub async fn run(&self, job: &dyn RemoteJob, cancel: &CancellationToken) -> Result<PollOutcome, AnalyzerError> {
        let mut state = PollState::new();

        let submission_id = match &self.config.mode {
            PollMode::LookupOnly(reference) => {
                debug!(analyzer = %self.name, reference = %reference, "Lookup only, skipping submission");
                reference.clone()
            }
            PollMode::SubmitAndWait | PollMode::SubmitOnly => match self.submit(job, &mut state, cancel).await? {
                Submission::AlreadyAnalyzed(payload) => {
                    info!(analyzer = %self.name, "Service reports target already analyzed");
                    return Ok(PollOutcome {
                        payload,
                        submission_id: None,
                        poll_attempts: 0,
                        already_analyzed: true,
                    });
                }
                Submission::Accepted(id) => id,
            },
        };
        state.submission_id = Some(submission_id.clone());

        if self.config.mode == PollMode::SubmitOnly {
            info!(analyzer = %self.name, submission_id = %submission_id, "Submitted without waiting");
            return Ok(PollOutcome {
                payload: json!({"submission_id": submission_id, "status": "submitted"}),
                submission_id: Some(submission_id),
                poll_attempts: 0,
                already_analyzed: false,
            });
        }

        let payload = self.poll(job, &submission_id, &mut state, cancel).await?;
        let payload = job
            .fetch(&submission_id, payload)
            .await
            .map_err(|e| AnalyzerError::remote_failure(format!("fetching result: {}", e)))?;

        info!(
            analyzer = %self.name,
            submission_id = %submission_id,
            attempts = state.attempts,
            "Remote analysis completed"
        );
        Ok(PollOutcome {
            payload,
            submission_id: Some(submission_id),
            poll_attempts: state.attempts,
            already_analyzed: false,
        })
    }

    async fn submit(
        &self,
        job: &dyn RemoteJob,
        state: &mut PollState,
        cancel: &CancellationToken,
    ) -> Result<Submission, AnalyzerError> {
        loop {
            self.check_cancelled(cancel, state)?;
            state.submit_attempts += 1;

            match job.submit().await {
                Ok(submission) => return Ok(submission),
                Err(RemoteError::Transport(err)) if err.is_transient() => {
                    warn!(
                        analyzer = %self.name,
                        attempt = state.submit_attempts,
                        max = self.config.submit_attempts,
                        error = %err,
                        "Submission failed"
                    );
                    if state.submit_attempts >= self.config.submit_attempts {
                        return Err(AnalyzerError::new(
                            ErrorKind::SubmitExhausted,
                            format!(
                                "submission failed after {} attempts: {}",
                                state.submit_attempts, err
                            ),
                        ));
                    }
                    self.pause(self.config.submit_delay, cancel, state).await?;
                }
                Err(err) => {
                    warn!(analyzer = %self.name, error = %err, "Submission rejected");
                    return Err(AnalyzerError::remote_failure(format!("submission: {}", err)));
                }
            }
        }
    }

    async fn poll(
        &self,
        job: &dyn RemoteJob,
        submission_id: &str,
        state: &mut PollState,
        cancel: &CancellationToken,
    ) -> Result<Value, AnalyzerError> {
        state.start_deadline(&self.config);
        while state.attempts < self.config.poll_attempts {
            if state.attempts > 0 {
                self.pause(self.config.poll_interval, cancel, state).await?;
            }
            self.check_cancelled(cancel, state)?;
            if state.past_deadline() {
                warn!(analyzer = %self.name, attempts = state.attempts, "Poll deadline elapsed");
                return Err(AnalyzerError::new(
                    ErrorKind::PollExhausted,
                    format!(
                        "deadline elapsed after {} attempts; last status {:?}",
                        state.attempts, state.last_status
                    ),
                ));
            }

            state.attempts += 1;
            debug!(
                analyzer = %self.name,
                submission_id = %submission_id,
                attempt = state.attempts,
                max = self.config.poll_attempts,
                "Polling"
            );

            match job.poll(submission_id).await {
                Ok(RemoteStatus::Pending) => {
                    state.last_status = Some(ObservedStatus::Pending);
                }
                Ok(RemoteStatus::Completed(payload)) => {
                    state.last_status = Some(ObservedStatus::Completed);
                    return Ok(payload);
                }
                Ok(RemoteStatus::Failed(detail)) => {
                    state.last_status = Some(ObservedStatus::Failed);
                    warn!(analyzer = %self.name, detail = %detail, "Remote analysis failed");
                    return Err(AnalyzerError::remote_failure(detail));
                }
                Ok(RemoteStatus::Missing(detail)) => {
                    state.last_status = Some(ObservedStatus::Missing);
                    warn!(analyzer = %self.name, detail = %detail, "Remote submission missing");
                    return Err(AnalyzerError::new(ErrorKind::RemoteMissing, detail));
                }
                Err(RemoteError::Transport(err)) if err.is_transient() => {
                    state.last_status = Some(ObservedStatus::Unreachable);
                    warn!(
                        analyzer = %self.name,
                        attempt = state.attempts,
                        error = %err,
                        "Status call failed"
                    );
                }
                Err(err) => {
                    return Err(AnalyzerError::remote_failure(format!("status: {}", err)));
                }
            }
        }

        warn!(
            analyzer = %self.name,
            attempts = state.attempts,
            "Poll budget exhausted"
        );
        Err(AnalyzerError::new(
            ErrorKind::PollExhausted,
            format!(
                "no terminal status after {} attempts; last status {:?}",
                state.attempts, state.last_status
            ),
        ))
    }

    async fn pause(&self, delay: Duration, cancel: &CancellationToken, state: &PollState) -> Result<(), AnalyzerError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(self.cancelled(state)),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn check_cancelled(&self, cancel: &CancellationToken, state: &PollState) -> Result<(), AnalyzerError> {
        if cancel.is_cancelled() {
            return Err(self.cancelled(state));
        }
        Ok(())
    }

    fn cancelled(&self, state: &PollState) -> AnalyzerError {
        info!(analyzer = %self.name, attempts = state.attempts, "Run cancelled");
        AnalyzerError::new(
            ErrorKind::Cancelled,
            format!(
                "job cancelled after {} submit and {} poll attempts",
                state.submit_attempts, state.attempts
            ),
        )
    }
}
