//! Doc_Info: Office container triage in the spirit of olevba.
//!
//! OLE2 documents keep stream names in UTF-16LE directory entries and VBA
//! source in lightly compressed streams, so a byte-level keyword scan finds
//! most auto-exec and suspicious tokens. OOXML packages are zip archives;
//! for those only the presence of `vbaProject.bin` is reported.

use super::{Analyzer, AnalyzerContext};
use crate::core::errors::AnalyzerError;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use async_trait::async_trait;
use memchr::memmem;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::BTreeSet;

const OLE2_MAGIC: &[u8] = b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

const AUTOEXEC: &[&str] = &[
    "AutoOpen",
    "Auto_Open",
    "AutoExec",
    "AutoClose",
    "Auto_Close",
    "AutoNew",
    "Document_Open",
    "DocumentOpen",
    "Document_Close",
    "Document_New",
    "Workbook_Open",
    "Workbook_Activate",
    "Workbook_Close",
];

const SUSPICIOUS: &[&str] = &[
    "Shell",
    "WScript.Shell",
    "ShellExecute",
    "CreateObject",
    "GetObject",
    "CallByName",
    "URLDownloadToFile",
    "XMLHTTP",
    "ADODB.Stream",
    "Environ",
    "Kill",
    "Lib",
    "VirtualAlloc",
    "RtlMoveMemory",
    "CreateThread",
    "PowerShell",
    "Chr",
    "StrReverse",
    "DDEAUTO",
];

fn keyword_matcher(words: &[&str]) -> AhoCorasick {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .build(words)
        .expect("valid keyword automaton")
}

static AUTOEXEC_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| keyword_matcher(AUTOEXEC));
static SUSPICIOUS_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| keyword_matcher(SUSPICIOUS));

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Keywords present as whole identifiers.
fn hits(matcher: &AhoCorasick, words: &[&'static str], data: &[u8]) -> BTreeSet<&'static str> {
    let mut found = BTreeSet::new();
    for m in matcher.find_overlapping_iter(data) {
        let before = m.start() == 0 || !is_ident(data[m.start() - 1]);
        let after = data.get(m.end()).map_or(true, |&b| !is_ident(b));
        if before && after {
            found.insert(words[m.pattern().as_usize()]);
        }
    }
    found
}

fn ole2_application(data: &[u8]) -> Option<&'static str> {
    [
        ("WordDocument", "word"),
        ("Workbook", "excel"),
        ("Book", "excel"),
        ("PowerPoint Document", "powerpoint"),
    ]
    .into_iter()
    .find(|(stream, _)| memmem::find(data, &utf16le(stream)).is_some())
    .map(|(_, app)| app)
}

fn ooxml_application(data: &[u8]) -> Option<&'static str> {
    [("word/", "word"), ("xl/", "excel"), ("ppt/", "powerpoint")]
        .into_iter()
        .find(|(prefix, _)| memmem::find(data, prefix.as_bytes()).is_some())
        .map(|(_, app)| app)
}

pub fn inspect(data: &[u8]) -> Result<Value, AnalyzerError> {
    if data.starts_with(OLE2_MAGIC) {
        let has_vba = memmem::find(data, &utf16le("_VBA_PROJECT")).is_some()
            || memmem::find(data, b"Attribute VB_").is_some();
        let autoexec = hits(&AUTOEXEC_MATCHER, AUTOEXEC, data);
        let suspicious = hits(&SUSPICIOUS_MATCHER, SUSPICIOUS, data);
        let dde = suspicious.contains("DDEAUTO");
        return Ok(json!({
            "container": "ole2",
            "application": ole2_application(data),
            "has_vba": has_vba,
            "autoexec": autoexec,
            "suspicious_keywords": suspicious,
            "dde": dde,
            "suspicious": (has_vba && !autoexec.is_empty()) || dde,
        }));
    }

    if data.starts_with(ZIP_MAGIC) {
        if memmem::find(data, b"[Content_Types].xml").is_none() {
            return Err(AnalyzerError::analysis_failed(
                "zip archive without [Content_Types].xml is not an OOXML package",
            ));
        }
        let has_vba = memmem::find(data, b"vbaProject.bin").is_some();
        return Ok(json!({
            "container": "ooxml",
            "application": ooxml_application(data),
            "has_vba": has_vba,
            "autoexec": [],
            "suspicious_keywords": [],
            "dde": false,
            "suspicious": has_vba,
        }));
    }

    Err(AnalyzerError::analysis_failed("neither an OLE2 nor an OOXML container"))
}

pub struct DocInfo {
    ctx: AnalyzerContext,
}

impl DocInfo {
    pub fn new(ctx: AnalyzerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Analyzer for DocInfo {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        inspect(self.ctx.file()?.data())
    }
}
