//! Yara_Scan: match the file against inline and on-disk rule sets.

use super::{Analyzer, AnalyzerContext};
use crate::core::errors::AnalyzerError;
use crate::yara::RuleSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YaraParams {
    /// Inline rule sources
    pub rules: Vec<String>,
    /// Directories scanned for `.yar`/`.yara` files
    pub directories_with_rules: Vec<PathBuf>,
}

pub struct YaraScan {
    ctx: AnalyzerContext,
    rules: RuleSet,
    sources: usize,
    /// Rule files that failed to compile, with the reason
    skipped: Vec<(PathBuf, String)>,
}

fn rule_files(dir: &Path) -> Result<Vec<PathBuf>, AnalyzerError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        AnalyzerError::invalid_parameters(format!("rule directory {}: {}", dir.display(), e))
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("yar") || e.eq_ignore_ascii_case("yara"))
        })
        .collect();
    files.sort();
    Ok(files)
}

impl YaraScan {
    /// Load and compile the rule sources.
    ///
    /// Inline rules must compile. A rule file that does not compile on its
    /// own (unsupported syntax, unreadable) is skipped and listed in the
    /// report; the analyzer fails only when nothing usable remains.
    pub fn new(ctx: AnalyzerContext, params: YaraParams) -> Result<Self, AnalyzerError> {
        if !params.rules.is_empty() {
            RuleSet::compile(&params.rules)
                .map_err(|e| AnalyzerError::invalid_parameters(format!("{}: inline rules: {}", ctx.name, e)))?;
        }

        let mut sources = params.rules.clone();
        let mut skipped = Vec::new();
        for dir in &params.directories_with_rules {
            for path in rule_files(dir)? {
                let text = match std::fs::read_to_string(&path) {
                    Ok(text) => text,
                    Err(e) => {
                        skipped.push((path, e.to_string()));
                        continue;
                    }
                };
                match RuleSet::compile(&[&text]) {
                    Ok(_) => sources.push(text),
                    Err(e) => {
                        warn!(analyzer = %ctx.name, file = %path.display(), error = %e, "Skipping rule file");
                        skipped.push((path, e.to_string()));
                    }
                }
            }
        }
        if sources.is_empty() {
            return Err(AnalyzerError::invalid_parameters(format!(
                "{}: no usable rules configured ({} rule files skipped)",
                ctx.name,
                skipped.len()
            )));
        }

        let rules = RuleSet::compile(&sources)
            .map_err(|e| AnalyzerError::invalid_parameters(format!("{}: {}", ctx.name, e)))?;
        debug!(analyzer = %ctx.name, rules = rules.rules().len(), skipped = skipped.len(), "Compiled YARA rules");
        Ok(Self {
            ctx,
            rules,
            sources: sources.len(),
            skipped,
        })
    }
}

#[async_trait]
impl Analyzer for YaraScan {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        let file = self.ctx.file()?;
        let matches = self.rules.scan(file.data());
        Ok(json!({
            "rule_sources": self.sources,
            "rules_loaded": self.rules.rules().len(),
            "matches": matches,
            "skipped_rule_files": self
                .skipped
                .iter()
                .map(|(path, reason)| json!({"file": path.display().to_string(), "error": reason}))
                .collect::<Vec<_>>(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;
    use crate::core::target::Target;
    use crate::io::TargetBytes;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn ctx(data: &'static [u8]) -> AnalyzerContext {
        let target = Target::file(
            TargetBytes::from_bytes("sample.exe", data),
            crate::hashing::md5_digest(data),
            "application/x-dosexec".into(),
        );
        AnalyzerContext::new("Yara_Scan", Uuid::new_v4(), Arc::new(target), CancellationToken::new())
    }

    #[tokio::test]
    async fn matches_inline_and_directory_rules() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("pe.yar"),
            r#"rule IsPE : pe { strings: $mz = { 4D 5A } condition: $mz }"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a rule").unwrap();

        let params = YaraParams {
            rules: vec![r#"rule Beacon { strings: $a = "beacon.dll" nocase condition: $a }"#.into()],
            directories_with_rules: vec![dir.path().to_path_buf()],
        };
        let analyzer = YaraScan::new(ctx(b"MZ\x90\x00 loads BEACON.DLL"), params).unwrap();
        let report = analyzer.run().await;

        assert!(report.success());
        let payload = report.payload();
        assert_eq!(payload["rule_sources"], 2);
        let names: Vec<&str> = payload["matches"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["rule"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["Beacon", "IsPE"]);
    }

    #[test]
    fn broken_rule_is_invalid_parameters() {
        let params = YaraParams {
            rules: vec!["rule Broken { condition: ".into()],
            ..YaraParams::default()
        };
        let err = YaraScan::new(ctx(b"MZ"), params).err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
    }

    #[tokio::test]
    async fn unsupported_rule_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("a_pe.yar"),
            r#"rule IsPE { strings: $mz = { 4D 5A } condition: $mz }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b_module.yar"),
            "import \"pe\"\nrule Signed { condition: pe.number_of_signatures > 0 }",
        )
        .unwrap();

        let params = YaraParams {
            directories_with_rules: vec![dir.path().to_path_buf()],
            ..YaraParams::default()
        };
        let report = YaraScan::new(ctx(b"MZ\x90\x00"), params).unwrap().run().await;

        assert!(report.success());
        let payload = report.payload();
        assert_eq!(payload["rule_sources"], 1);
        assert_eq!(payload["matches"][0]["rule"], "IsPE");
        let skipped = payload["skipped_rule_files"].as_array().unwrap();
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0]["file"].as_str().unwrap().ends_with("b_module.yar"));
    }

    #[test]
    fn only_broken_rule_files_is_invalid_parameters() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.yar"), "rule Broken { condition: ").unwrap();
        let params = YaraParams {
            directories_with_rules: vec![dir.path().to_path_buf()],
            ..YaraParams::default()
        };
        let err = YaraScan::new(ctx(b"MZ"), params).err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
        assert!(err.detail.contains("1 rule files skipped"));
    }

    #[test]
    fn no_rules_is_invalid_parameters() {
        let err = YaraScan::new(ctx(b"MZ"), YaraParams::default()).err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
    }
}
