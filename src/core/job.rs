//! Job descriptor handed to the core by job intake.

use crate::core::observable::ObservableKind;
use crate::core::target::TargetKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// What the job analyzes, as submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobTarget {
    /// A file previously stored by the upload layer
    File {
        /// Storage reference (relative path under the media root)
        reference: String,
        /// Mimetype declared at submission, if any
        #[serde(default)]
        mimetype: Option<String>,
    },
    /// A hash, URL, domain or IP address
    Observable {
        value: String,
        #[serde(default)]
        classification: Option<ObservableKind>,
    },
}

/// One analysis request.
///
/// Target data is immutable once the job exists; the only thing a job
/// accumulates is one report per requested analyzer, held by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub target: JobTarget,
    /// MD5 of the target content; computed by the resolver when absent
    #[serde(default)]
    pub md5: Option<String>,
    pub analyzers_requested: Vec<String>,
    /// Forbids sending the target to external services
    #[serde(default)]
    pub force_privacy: bool,
    /// Per-analyzer parameter overrides merged over the `AnalyzerSpec` defaults
    #[serde(default)]
    pub runtime_params: BTreeMap<String, Map<String, Value>>,
}

impl Job {
    /// New file job for a stored reference.
    pub fn file<S: Into<String>>(reference: impl Into<String>, analyzers: impl IntoIterator<Item = S>) -> Self {
        Self::with_target(
            JobTarget::File {
                reference: reference.into(),
                mimetype: None,
            },
            analyzers,
        )
    }

    /// New observable job; classification is inferred unless declared later.
    pub fn observable<S: Into<String>>(value: impl Into<String>, analyzers: impl IntoIterator<Item = S>) -> Self {
        Self::with_target(
            JobTarget::Observable {
                value: value.into(),
                classification: None,
            },
            analyzers,
        )
    }

    fn with_target<S: Into<String>>(target: JobTarget, analyzers: impl IntoIterator<Item = S>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            md5: None,
            analyzers_requested: analyzers.into_iter().map(Into::into).collect(),
            force_privacy: false,
            runtime_params: BTreeMap::new(),
        }
    }

    pub fn with_privacy(mut self, force_privacy: bool) -> Self {
        self.force_privacy = force_privacy;
        self
    }

    pub fn with_md5(mut self, md5: impl Into<String>) -> Self {
        self.md5 = Some(md5.into());
        self
    }

    /// Declare the file mimetype; ignored for observable jobs.
    pub fn with_mimetype(mut self, declared: impl Into<String>) -> Self {
        if let JobTarget::File { mimetype, .. } = &mut self.target {
            *mimetype = Some(declared.into());
        }
        self
    }

    /// Declare the observable classification; ignored for file jobs.
    pub fn with_classification(mut self, kind: ObservableKind) -> Self {
        if let JobTarget::Observable { classification, .. } = &mut self.target {
            *classification = Some(kind);
        }
        self
    }

    /// Override parameters for one analyzer of this job.
    pub fn with_runtime_params(mut self, analyzer: impl Into<String>, params: Value) -> Self {
        if let Value::Object(map) = params {
            self.runtime_params.insert(analyzer.into(), map);
        }
        self
    }

    pub fn target_kind(&self) -> TargetKind {
        match self.target {
            JobTarget::File { .. } => TargetKind::File,
            JobTarget::Observable { .. } => TargetKind::Observable,
        }
    }

    /// Requested names with duplicates collapsed, first occurrence first.
    pub fn distinct_analyzers(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.analyzers_requested
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect()
    }
}
