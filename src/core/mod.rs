//! Core data model shared by every component.

pub mod errors;
pub mod job;
pub mod observable;
pub mod params;
pub mod report;
pub mod spec;
pub mod target;

pub use errors::{AnalyzerError, ErrorKind};
pub use job::{Job, JobTarget};
pub use observable::{Observable, ObservableKind};
pub use report::{Report, ReportClock};
pub use spec::{AnalyzerKind, AnalyzerSpec, Applicability};
pub use target::{Target, TargetContent, TargetKind};
