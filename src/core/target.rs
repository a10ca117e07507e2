//! Resolved analysis target shared by every analyzer of a job.

use crate::core::observable::{Observable, ObservableKind};
use crate::io::TargetBytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Target kinds a job can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    File,
    Observable,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::File => f.write_str("file"),
            TargetKind::Observable => f.write_str("observable"),
        }
    }
}

/// Resolved content of the target.
#[derive(Debug, Clone)]
pub enum TargetContent {
    File(TargetBytes),
    Observable(Observable),
}

/// A resolved, read-only target.
///
/// Analyzers receive it behind an `Arc`; nothing here is mutable, so the
/// byte handle is shared by all concurrently running analyzers.
#[derive(Debug, Clone)]
pub struct Target {
    content: TargetContent,
    md5: String,
    mimetype: Option<String>,
    size: u64,
}

impl Target {
    pub fn file(bytes: TargetBytes, md5: String, mimetype: String) -> Self {
        let size = bytes.len() as u64;
        Self {
            content: TargetContent::File(bytes),
            md5,
            mimetype: Some(mimetype),
            size,
        }
    }

    pub fn observable(observable: Observable, md5: String) -> Self {
        let size = observable.value.len() as u64;
        Self {
            content: TargetContent::Observable(observable),
            md5,
            mimetype: None,
            size,
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self.content {
            TargetContent::File(_) => TargetKind::File,
            TargetContent::Observable(_) => TargetKind::Observable,
        }
    }

    pub fn content(&self) -> &TargetContent {
        &self.content
    }

    /// File bytes, for file targets.
    pub fn bytes(&self) -> Option<&TargetBytes> {
        match &self.content {
            TargetContent::File(bytes) => Some(bytes),
            TargetContent::Observable(_) => None,
        }
    }

    /// The observable, for observable targets.
    pub fn as_observable(&self) -> Option<&Observable> {
        match &self.content {
            TargetContent::Observable(obs) => Some(obs),
            TargetContent::File(_) => None,
        }
    }

    pub fn observable_kind(&self) -> Option<ObservableKind> {
        self.as_observable().map(|o| o.kind)
    }

    pub fn md5(&self) -> &str {
        &self.md5
    }

    pub fn mimetype(&self) -> Option<&str> {
        self.mimetype.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Short description used in logs and applicability messages.
    pub fn describe(&self) -> String {
        match &self.content {
            TargetContent::File(bytes) => format!(
                "file '{}' ({})",
                bytes.reference(),
                self.mimetype.as_deref().unwrap_or("unknown")
            ),
            TargetContent::Observable(obs) => format!("{} '{}'", obs.kind, obs.value),
        }
    }
}
