//! Ancalagon: analyzer execution and polling framework for malware and
//! threat-intelligence jobs.
//!
//! A [`core::job::Job`] names one target (a stored file or an observable) and
//! a list of analyzers. The [`dispatch::Dispatcher`] resolves the target, runs
//! every requested analyzer concurrently with per-analyzer failure isolation,
//! and folds the resulting [`core::report::Report`]s into a
//! [`aggregate::JobResult`]. Remote analyzers share the submit/poll state
//! machine in [`poll`].

/// Core data model: jobs, targets, specs, reports and the error taxonomy
pub mod core;

pub mod aggregate;
pub mod analyzers;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod entropy;
pub mod error;
pub mod hashing;
pub mod io;
pub mod logging;
pub mod poll;
pub mod resolver;
pub mod sink;
pub mod sniff;
pub mod strings;
pub mod timeout;
pub mod transport;
pub mod yara;

pub use crate::aggregate::JobResult;
pub use crate::core::errors::{AnalyzerError, ErrorKind};
pub use crate::core::job::Job;
pub use crate::core::report::Report;
pub use crate::dispatch::Dispatcher;
pub use crate::error::{AncalagonError, Result};
