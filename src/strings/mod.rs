//! Bounded string extraction with optional IOC classification.
//!
//! Input is scanned in fixed-size chunks; the caller's [`StepGuard`] is
//! checked between chunks so large files honor job cancellation and the
//! analyzer deadline.

pub mod classify;
mod config;
pub mod patterns;
pub mod scan;

pub use classify::{classify_strings, IocSummary};
pub use config::{StringsConfig, DEFAULT_CHUNK_SIZE};
pub use scan::{Encoding, ExtractedString, StringScanner};

use crate::core::errors::AnalyzerError;
use crate::timeout::StepGuard;
use serde::Serialize;
use tracing::debug;

/// Extraction result.
#[derive(Debug, Clone, Serialize)]
pub struct StringsSummary {
    pub strings: Vec<ExtractedString>,
    /// Strings found before the cap was applied
    pub total_found: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iocs: Option<IocSummary>,
}

/// Extract strings from `data`, checking `guard` between chunks.
pub fn extract_summary(data: &[u8], cfg: &StringsConfig, guard: &mut StepGuard) -> Result<StringsSummary, AnalyzerError> {
    let mut scanner = StringScanner::new(cfg);
    for chunk in data.chunks(cfg.effective_chunk_size()) {
        guard.check()?;
        scanner.feed(chunk);
    }
    let scanned = scanner.finish();

    debug!(
        found = scanned.total,
        kept = scanned.strings.len(),
        chunks = guard.steps(),
        "String extraction finished"
    );

    let iocs = cfg
        .classify
        .then(|| classify_strings(scanned.strings.iter().map(|s| s.text.as_str())));

    Ok(StringsSummary {
        truncated: scanned.total > scanned.strings.len(),
        total_found: scanned.total,
        strings: scanned.strings,
        iocs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn extracts_and_classifies() {
        let data = b"\x00\x01http://c2.badhost.com/gate.php\x00\x02kernel32.dll\x00";
        let mut guard = StepGuard::new(CancellationToken::new(), "strings");
        let summary = extract_summary(data, &StringsConfig::default(), &mut guard).unwrap();
        assert_eq!(summary.total_found, 2);
        assert!(!summary.truncated);
        let iocs = summary.iocs.unwrap();
        assert!(iocs.urls.contains("http://c2.badhost.com/gate.php"));
    }

    #[test]
    fn checks_guard_per_chunk() {
        let data = vec![b'A'; 10_000];
        let cfg = StringsConfig {
            chunk_size: 1000,
            classify: false,
            ..StringsConfig::default()
        };
        let mut guard = StepGuard::new(CancellationToken::new(), "strings");
        let summary = extract_summary(&data, &cfg, &mut guard).unwrap();
        assert_eq!(guard.steps(), 10);
        assert_eq!(summary.strings.len(), 1);
        assert_eq!(summary.strings[0].text.len(), 1000);
        assert!(summary.iocs.is_none());
    }

    #[test]
    fn cancelled_before_scan() {
        let token = CancellationToken::new();
        token.cancel();
        let mut guard = StepGuard::new(token, "strings");
        let err = extract_summary(b"abcdefgh", &StringsConfig::default(), &mut guard).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }
}
