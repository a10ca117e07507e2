//! Analyzer catalogue: the process-wide set of [`AnalyzerSpec`]s.

use crate::core::observable::ObservableKind;
use crate::core::spec::{AnalyzerKind, AnalyzerSpec, Applicability};
use crate::core::target::TargetKind;
use crate::error::{AncalagonError, Result};
use crate::sniff::{OFFICE_MIMETYPES, PE_MIMETYPES};
use serde_json::json;
use std::collections::HashMap;

/// Name-indexed, immutable collection of analyzer specs.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerCatalog {
    specs: Vec<AnalyzerSpec>,
    index: HashMap<String, usize>,
}

impl AnalyzerCatalog {
    /// Build a catalogue; names must be unique.
    pub fn from_specs(specs: Vec<AnalyzerSpec>) -> Result<Self> {
        let mut index = HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return Err(AncalagonError::Config("analyzer with empty name".into()));
            }
            if index.insert(spec.name.clone(), i).is_some() {
                return Err(AncalagonError::Config(format!(
                    "duplicate analyzer name '{}'",
                    spec.name
                )));
            }
        }
        Ok(Self { specs, index })
    }

    /// The built-in analyzers with their default parameters.
    pub fn builtin() -> Self {
        let specs = builtin_specs();
        let index = specs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        Self { specs, index }
    }

    pub fn get(&self, name: &str) -> Option<&AnalyzerSpec> {
        self.index.get(name).map(|&i| &self.specs[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    pub fn specs(&self) -> &[AnalyzerSpec] {
        &self.specs
    }

    pub fn into_specs(self) -> Vec<AnalyzerSpec> {
        self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn builtin_specs() -> Vec<AnalyzerSpec> {
    use AnalyzerKind::*;

    let any_observable = Applicability::observables_of(&[
        ObservableKind::Hash,
        ObservableKind::Url,
        ObservableKind::Domain,
        ObservableKind::Ip,
    ]);
    let file_or_hash = Applicability {
        target_kinds: vec![TargetKind::File, TargetKind::Observable],
        mimetypes: Vec::new(),
        observable_kinds: vec![ObservableKind::Hash],
    };

    vec![
        // Local
        AnalyzerSpec::new("File_Info", FileInfo, Applicability::files()),
        AnalyzerSpec::new("Strings_Info_Classic", StringsInfo, Applicability::files()).with_params(json!({
            "min_length": 4,
            "max_number_of_strings": 500,
            "max_characters_for_string": 1000,
            "classify": true
        })),
        AnalyzerSpec::new("PE_Info", PeInfo, Applicability::files_of(PE_MIMETYPES))
            .with_params(json!({"max_imports": 2048})),
        AnalyzerSpec::new("Signature_Info", SignatureInfo, Applicability::files_of(PE_MIMETYPES)),
        AnalyzerSpec::new("Yara_Scan", YaraScan, Applicability::files())
            .with_params(json!({"rules": [], "directories_with_rules": []})),
        AnalyzerSpec::new("PDF_Info", PdfInfo, Applicability::files_of(&["application/pdf"])),
        AnalyzerSpec::new(
            "Rtf_Info",
            RtfInfo,
            Applicability::files_of(&["text/rtf", "application/rtf"]),
        ),
        AnalyzerSpec::new("Doc_Info", DocInfo, Applicability::files_of(OFFICE_MIMETYPES)),
        // Remote
        AnalyzerSpec::new("Cuckoo_Scan", CuckooScan, Applicability::files()).with_params(json!({
            "max_post_tries": 5,
            "max_poll_tries": 20,
            "poll_distance": 30,
            "wait_for_completion": true
        })),
        AnalyzerSpec::new("VT_v3_Scan", VirusTotalScan, Applicability::files()).with_params(json!({
            "max_tries": 10,
            "poll_distance": 30,
            "force_rescan": false,
            "wait_for_completion": true
        })),
        AnalyzerSpec::new("VT_v3_Get", VirusTotalGet, any_observable.clone())
            .with_params(json!({"force_active_scan": false})),
        AnalyzerSpec::new("VT_v3_Get_And_Scan", VirusTotalGet, file_or_hash).with_params(json!({
            "force_active_scan": true,
            "max_tries": 10,
            "poll_distance": 30,
            "wait_for_completion": true
        })),
        AnalyzerSpec::new("Intezer_Scan", IntezerScan, Applicability::files_of(PE_MIMETYPES)).with_params(json!({
            "max_tries": 200,
            "poll_distance": 3,
            "wait_for_completion": true
        })),
        AnalyzerSpec::new("PEframe_Scan", Peframe, Applicability::files()).with_params(json!({
            "max_tries": 15,
            "poll_distance": 5,
            "wait_for_completion": true
        })),
        AnalyzerSpec::new("Thug_HTML_Info", Thug, Applicability::files_of(&["text/html"])).with_params(json!({
            "max_tries": 15,
            "poll_distance": 10,
            "wait_for_completion": true
        })),
        AnalyzerSpec::new(
            "Thug_URL_Info",
            Thug,
            Applicability::observables_of(&[ObservableKind::Url, ObservableKind::Domain]),
        )
        .with_params(json!({
            "max_tries": 15,
            "poll_distance": 10,
            "wait_for_completion": true
        })),
    ]
}
