//! PDF_Info: pdfid-style keyword census.

use super::{Analyzer, AnalyzerContext};
use crate::core::errors::AnalyzerError;
use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use memchr::memmem;
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};

const KEYWORDS: &[&str] = &[
    "obj",
    "endobj",
    "stream",
    "endstream",
    "xref",
    "trailer",
    "startxref",
    "/Page",
    "/Encrypt",
    "/ObjStm",
    "/JS",
    "/JavaScript",
    "/AA",
    "/OpenAction",
    "/AcroForm",
    "/JBIG2Decode",
    "/RichMedia",
    "/Launch",
    "/EmbeddedFile",
    "/XFA",
    "/URI",
];

/// Keywords whose presence marks the document as suspicious
const SUSPICIOUS: &[&str] = &[
    "/JS",
    "/JavaScript",
    "/AA",
    "/OpenAction",
    "/Launch",
    "/EmbeddedFile",
    "/RichMedia",
    "/XFA",
];

static KEYWORD_MATCHER: Lazy<AhoCorasick> =
    Lazy::new(|| AhoCorasick::new(KEYWORDS).expect("valid keyword automaton"));

/// Header search window, as in pdfid
const HEADER_WINDOW: usize = 1024;

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn header_version(data: &[u8]) -> Option<String> {
    let window = &data[..data.len().min(HEADER_WINDOW)];
    let at = memmem::find(window, b"%PDF-")?;
    let version: String = window[at + 5..]
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|&b| b as char)
        .collect();
    Some(version)
}

/// Count each keyword as a whole token.
fn keyword_counts(data: &[u8]) -> Vec<usize> {
    let mut counts = vec![0usize; KEYWORDS.len()];
    for m in KEYWORD_MATCHER.find_overlapping_iter(data) {
        let keyword = KEYWORDS[m.pattern().as_usize()].as_bytes();
        let before_ok = keyword[0] == b'/' || m.start() == 0 || !is_name_char(data[m.start() - 1]);
        let after_ok = data.get(m.end()).map_or(true, |&b| !is_name_char(b));
        if before_ok && after_ok {
            counts[m.pattern().as_usize()] += 1;
        }
    }
    counts
}

pub fn inspect(data: &[u8]) -> Result<Value, AnalyzerError> {
    let version = header_version(data)
        .ok_or_else(|| AnalyzerError::analysis_failed("no PDF header in the first 1024 bytes"))?;

    let counts = keyword_counts(data);
    let mut keywords = Map::new();
    for (keyword, count) in KEYWORDS.iter().zip(&counts) {
        keywords.insert(keyword.to_string(), json!(count));
    }
    let suspicious: Vec<&str> = KEYWORDS
        .iter()
        .zip(&counts)
        .filter(|&(keyword, count)| *count > 0 && SUSPICIOUS.contains(keyword))
        .map(|(keyword, _)| *keyword)
        .collect();

    Ok(json!({
        "version": version,
        "eof_markers": memmem::find_iter(data, b"%%EOF").count(),
        "keywords": keywords,
        "suspicious": !suspicious.is_empty(),
        "suspicious_keywords": suspicious,
    }))
}

pub struct PdfInfo {
    ctx: AnalyzerContext,
}

impl PdfInfo {
    pub fn new(ctx: AnalyzerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Analyzer for PdfInfo {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        inspect(self.ctx.file()?.data())
    }
}
