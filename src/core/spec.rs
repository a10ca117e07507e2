//! Static analyzer configuration.

use crate::core::errors::AnalyzerError;
use crate::core::observable::ObservableKind;
use crate::core::target::{Target, TargetKind};
use crate::timeout::{DEFAULT_LOCAL_TIMEOUT_SECONDS, DEFAULT_REMOTE_TIMEOUT_SECONDS};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Closed set of analyzer implementations.
///
/// Several specs may share one kind with different defaults
/// (`VT_v3_Get` and `VT_v3_Get_And_Scan` are both `VirusTotalGet`).
/// `Custom` names a factory registered on the dispatcher at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    FileInfo,
    StringsInfo,
    PeInfo,
    SignatureInfo,
    YaraScan,
    PdfInfo,
    RtfInfo,
    DocInfo,
    CuckooScan,
    VirusTotalScan,
    VirusTotalGet,
    IntezerScan,
    Peframe,
    Thug,
    Custom(String),
}

impl AnalyzerKind {
    /// Whether the kind talks to an external service.
    ///
    /// Custom kinds declare network use through their `AnalyzerSpec` only.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            AnalyzerKind::CuckooScan
                | AnalyzerKind::VirusTotalScan
                | AnalyzerKind::VirusTotalGet
                | AnalyzerKind::IntezerScan
                | AnalyzerKind::Peframe
                | AnalyzerKind::Thug
        )
    }
}

/// Which targets an analyzer accepts.
///
/// Empty lists mean "no restriction" on that axis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applicability {
    #[serde(default)]
    pub target_kinds: Vec<TargetKind>,
    /// Accepted mimetypes; a trailing `*` matches a prefix (`text/*`)
    #[serde(default)]
    pub mimetypes: Vec<String>,
    #[serde(default)]
    pub observable_kinds: Vec<ObservableKind>,
}

impl Applicability {
    pub fn files() -> Self {
        Self {
            target_kinds: vec![TargetKind::File],
            ..Self::default()
        }
    }

    pub fn files_of(mimetypes: &[&str]) -> Self {
        Self {
            target_kinds: vec![TargetKind::File],
            mimetypes: mimetypes.iter().map(|m| m.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn observables_of(kinds: &[ObservableKind]) -> Self {
        Self {
            target_kinds: vec![TargetKind::Observable],
            observable_kinds: kinds.to_vec(),
            ..Self::default()
        }
    }

    /// Evaluate the predicate; `Err` carries a human readable reason.
    pub fn check(&self, target: &Target) -> Result<(), String> {
        if !self.target_kinds.is_empty() && !self.target_kinds.contains(&target.kind()) {
            return Err(format!("does not accept {} targets", target.kind()));
        }

        match target.kind() {
            TargetKind::File => {
                if self.mimetypes.is_empty() {
                    return Ok(());
                }
                let mimetype = target.mimetype().unwrap_or_default().to_ascii_lowercase();
                if self.mimetypes.iter().any(|m| mime_matches(m, &mimetype)) {
                    Ok(())
                } else {
                    Err(format!("does not accept mimetype '{}'", mimetype))
                }
            }
            TargetKind::Observable => match target.observable_kind() {
                Some(kind)
                    if !self.observable_kinds.is_empty()
                        && !self.observable_kinds.contains(&kind) =>
                {
                    Err(format!("does not accept {} observables", kind))
                }
                _ => Ok(()),
            },
        }
    }
}

fn mime_matches(pattern: &str, mimetype: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    match pattern.strip_suffix('*') {
        Some(prefix) => mimetype.starts_with(prefix),
        None => pattern == mimetype,
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_LOCAL_TIMEOUT_SECONDS
}

/// Static configuration for one analyzer name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerSpec {
    pub name: String,
    pub kind: AnalyzerKind,
    #[serde(default)]
    pub applicability: Applicability,
    /// Analyzer sends the target (or its hash) to an external service
    #[serde(default)]
    pub requires_network: bool,
    /// Default parameters; job runtime parameters are merged over these
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Per-analyzer deadline enforced by the dispatcher
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl AnalyzerSpec {
    /// Spec with kind-appropriate network flag and timeout.
    pub fn new(name: impl Into<String>, kind: AnalyzerKind, applicability: Applicability) -> Self {
        let remote = kind.is_remote();
        Self {
            name: name.into(),
            kind,
            applicability,
            requires_network: remote,
            params: Map::new(),
            timeout_secs: if remote {
                DEFAULT_REMOTE_TIMEOUT_SECONDS
            } else {
                DEFAULT_LOCAL_TIMEOUT_SECONDS
            },
        }
    }

    /// Set default parameters from a JSON object; other values are ignored.
    pub fn with_params(mut self, params: Value) -> Self {
        if let Value::Object(map) = params {
            self.params = map;
        }
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    pub fn with_network(mut self, requires_network: bool) -> Self {
        self.requires_network = requires_network;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Applicability plus privacy policy for one job.
    pub fn admit(&self, target: &Target, force_privacy: bool) -> Result<(), AnalyzerError> {
        if force_privacy && self.requires_network {
            return Err(AnalyzerError::not_applicable(format!(
                "{} requires network access and the job forbids it",
                self.name
            )));
        }
        self.applicability
            .check(target)
            .map_err(|reason| AnalyzerError::not_applicable(format!("{} {}", self.name, reason)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;
    use crate::core::observable::Observable;
    use crate::io::TargetBytes;

    fn pe_target() -> Target {
        Target::file(
            TargetBytes::from_bytes("a.exe", &b"MZ"[..]),
            "00".repeat(16),
            "application/x-dosexec".into(),
        )
    }

    fn domain_target() -> Target {
        let obs = Observable::parse("evil.example.com", None).unwrap();
        Target::observable(obs, "00".repeat(16))
    }

    #[test]
    fn mimetype_predicate() {
        let pe_only = Applicability::files_of(&["application/x-dosexec"]);
        assert!(pe_only.check(&pe_target()).is_ok());
        assert!(pe_only.check(&domain_target()).is_err());

        let text = Applicability::files_of(&["text/*"]);
        assert!(text.check(&pe_target()).is_err());
    }

    #[test]
    fn observable_predicate() {
        let hashes = Applicability::observables_of(&[ObservableKind::Hash]);
        let err = hashes.check(&domain_target()).unwrap_err();
        assert!(err.contains("domain"));
        assert!(Applicability::default().check(&domain_target()).is_ok());
    }

    #[test]
    fn privacy_blocks_network_analyzers() {
        let spec = AnalyzerSpec::new("VT_v3_Get", AnalyzerKind::VirusTotalGet, Applicability::default());
        assert!(spec.requires_network);
        let err = spec.admit(&domain_target(), true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotApplicable);
        assert!(spec.admit(&domain_target(), false).is_ok());
    }

    #[test]
    fn spec_round_trips_through_json() {
        let spec = AnalyzerSpec::new("Rtf_Info", AnalyzerKind::RtfInfo, Applicability::files_of(&["text/rtf"]));
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["kind"], "rtf_info");
        let custom: AnalyzerSpec = serde_json::from_value(serde_json::json!({
            "name": "StaticInspect",
            "kind": {"custom": "static_inspect"}
        }))
        .unwrap();
        assert_eq!(custom.kind, AnalyzerKind::Custom("static_inspect".into()));
        assert_eq!(custom.timeout_secs, DEFAULT_LOCAL_TIMEOUT_SECONDS);
    }
}
