//! Engine configuration and per-run bookkeeping.

use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// How the engine drives a remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollMode {
    /// Submit, then poll until a terminal status
    SubmitAndWait,
    /// Submit and return the submission id without polling
    SubmitOnly,
    /// Skip submission; poll an existing reference (hash, url, task id)
    LookupOnly(String),
}

/// Budgets and pacing for one engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub mode: PollMode,
    pub submit_attempts: u32,
    pub submit_delay: Duration,
    pub poll_attempts: u32,
    pub poll_interval: Duration,
    /// Wall-clock bound on the polling phase, counted from the accepted
    /// submission, on top of the attempt budget
    pub deadline: Option<Duration>,
}

impl PollConfig {
    pub fn new(mode: PollMode) -> Self {
        Self {
            mode,
            submit_attempts: 3,
            submit_delay: Duration::from_secs(5),
            poll_attempts: 10,
            poll_interval: Duration::from_secs(30),
            deadline: None,
        }
    }

    pub fn with_submit(mut self, attempts: u32, delay: Duration) -> Self {
        self.submit_attempts = attempts.max(1);
        self.submit_delay = delay;
        self
    }

    pub fn with_poll(mut self, attempts: u32, interval: Duration) -> Self {
        self.poll_attempts = attempts.max(1);
        self.poll_interval = interval;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Last status a poll returned, for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedStatus {
    Pending,
    Completed,
    Failed,
    Missing,
    /// The status call itself failed at the transport level
    Unreachable,
}

/// Mutable state of one run, owned by the engine for its duration.
#[derive(Debug)]
pub struct PollState {
    pub submission_id: Option<String>,
    pub submit_attempts: u32,
    pub attempts: u32,
    pub last_status: Option<ObservedStatus>,
    pub deadline: Option<Instant>,
}

impl PollState {
    pub(crate) fn new() -> Self {
        Self {
            submission_id: None,
            submit_attempts: 0,
            attempts: 0,
            last_status: None,
            deadline: None,
        }
    }

    /// Start the polling clock; submission time does not count against it.
    pub(crate) fn start_deadline(&mut self, config: &PollConfig) {
        self.deadline = config.deadline.map(|d| Instant::now() + d);
    }

    pub(crate) fn past_deadline(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Terminal success of an engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub payload: Value,
    pub submission_id: Option<String>,
    /// Status calls consumed; zero for submit-only or already-analyzed runs
    pub poll_attempts: u32,
    /// The service reported a prior analysis at submission time
    pub already_analyzed: bool,
}
