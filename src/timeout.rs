//! Deadline and cancellation guards for analyzer runs.
//!
//! Remote analyzers are bounded by [`with_timeout`] at the dispatch boundary.
//! Local analyzers that walk large inputs use a [`StepGuard`] between discrete
//! inspection steps so that job cancellation and the analyzer deadline are
//! honored without a suspension point.

use crate::core::errors::{AnalyzerError, ErrorKind};
use crate::error::{AncalagonError, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Default deadline for remote analyzers in seconds
pub const DEFAULT_REMOTE_TIMEOUT_SECONDS: u64 = 600;

/// Default deadline for local analyzers in seconds
pub const DEFAULT_LOCAL_TIMEOUT_SECONDS: u64 = 60;

/// Timeout configuration for one bounded operation
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Maximum duration for the operation
    pub duration: Duration,
    /// Whether to log timeout errors
    pub log_warnings: bool,
    /// Operation name for logging
    pub operation_name: String,
}

impl TimeoutConfig {
    /// Create a new timeout configuration
    pub fn new(seconds: u64, operation: impl Into<String>) -> Self {
        Self {
            duration: Duration::from_secs(seconds),
            log_warnings: true,
            operation_name: operation.into(),
        }
    }

    /// Create a timeout configuration from an explicit duration
    pub fn from_duration(duration: Duration, operation: impl Into<String>) -> Self {
        Self {
            duration,
            log_warnings: true,
            operation_name: operation.into(),
        }
    }
}

/// Execute an async operation with a timeout
pub async fn with_timeout<T, F>(config: TimeoutConfig, future: F) -> Result<T>
where
    F: Future<Output = T>,
{
    debug!(
        "Starting operation '{}' with timeout of {}s",
        config.operation_name,
        config.duration.as_secs()
    );

    match timeout(config.duration, future).await {
        Ok(value) => {
            debug!("Operation '{}' completed", config.operation_name);
            Ok(value)
        }
        Err(_) => {
            if config.log_warnings {
                error!(
                    "Operation '{}' timed out after {}s",
                    config.operation_name,
                    config.duration.as_secs()
                );
            }

            Err(AncalagonError::Timeout {
                seconds: config.duration.as_secs(),
            })
        }
    }
}

/// Cooperative guard checked between inspection steps of a local analyzer.
pub struct StepGuard {
    cancel: CancellationToken,
    start: Instant,
    max_duration: Option<Duration>,
    steps: usize,
    operation_name: String,
}

impl StepGuard {
    /// Create a guard bound to a job cancellation token
    pub fn new(cancel: CancellationToken, operation: impl Into<String>) -> Self {
        Self {
            cancel,
            start: Instant::now(),
            max_duration: None,
            steps: 0,
            operation_name: operation.into(),
        }
    }

    /// Additionally bound the total wall time spent in the guarded loop
    pub fn with_max_duration(mut self, max: Duration) -> Self {
        self.max_duration = Some(max);
        self
    }

    /// Check for cancellation or deadline; call between discrete steps.
    pub fn check(&mut self) -> std::result::Result<(), AnalyzerError> {
        self.steps += 1;

        if self.cancel.is_cancelled() {
            warn!(
                "Operation '{}' cancelled after {} steps",
                self.operation_name, self.steps
            );
            return Err(AnalyzerError::new(
                ErrorKind::Cancelled,
                format!("cancelled after {} inspection steps", self.steps),
            ));
        }

        if let Some(max) = self.max_duration {
            let elapsed = self.start.elapsed();
            if elapsed > max {
                error!(
                    "Operation '{}' exceeded {:?} after {} steps",
                    self.operation_name, max, self.steps
                );
                return Err(AnalyzerError::new(
                    ErrorKind::Timeout,
                    format!("inspection exceeded {}s", max.as_secs()),
                ));
            }
        }

        Ok(())
    }

    /// Get the number of steps checked so far
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
