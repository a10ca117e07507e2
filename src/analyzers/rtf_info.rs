//! Rtf_Info: embedded objects in RTF documents, rtfobj-style.

use super::{Analyzer, AnalyzerContext};
use crate::core::errors::AnalyzerError;
use aho_corasick::{AhoCorasick, MatchKind};
use async_trait::async_trait;
use memchr::memmem;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Value};

const CONTROL_WORDS: &[&str] = &[
    "\\object",
    "\\objdata",
    "\\objclass",
    "\\objupdate",
    "\\objemb",
    "\\objlink",
    "\\objautlink",
];

const OLE2_MAGIC: &[u8] = b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1";

static CONTROL_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(CONTROL_WORDS)
        .expect("valid control word automaton")
});

#[derive(Debug, Default, Serialize)]
struct EmbeddedObject {
    offset: usize,
    class_name: Option<String>,
    hex_length: usize,
    decoded_size: usize,
    is_ole2: bool,
    has_pe: bool,
}

fn is_rtf(data: &[u8]) -> bool {
    let start = data.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(data.len());
    data[start..].starts_with(b"{\\rt")
}

/// A control word ends at the first non-letter.
fn ends_word(data: &[u8], end: usize) -> bool {
    data.get(end).map_or(true, |b| !b.is_ascii_alphabetic())
}

/// Plain text of a `\objclass` destination, up to the closing brace.
fn read_class(data: &[u8], from: usize) -> Option<String> {
    let rest = &data[from..];
    let end = memchr::memchr(b'}', rest)?;
    let name = String::from_utf8_lossy(&rest[..end]).trim().to_string();
    (!name.is_empty()).then_some(name)
}

/// Hex payload of a `\objdata` destination; whitespace is skipped and the
/// payload ends at the first group or control character.
fn read_hex(data: &[u8], from: usize) -> (usize, Vec<u8>) {
    let mut digits = Vec::new();
    for &b in &data[from..] {
        match b {
            b'{' | b'}' | b'\\' => break,
            b if b.is_ascii_whitespace() => continue,
            b if b.is_ascii_hexdigit() => digits.push(b),
            _ => break,
        }
    }
    let decoded = digits
        .chunks_exact(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok().and_then(|s| u8::from_str_radix(s, 16).ok()))
        .collect();
    (digits.len(), decoded)
}

fn has_pe(decoded: &[u8]) -> bool {
    memmem::find_iter(decoded, b"MZ").any(|at| {
        decoded
            .get(at + 0x3c..at + 0x40)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
            .and_then(|lfanew| decoded.get(at + lfanew..at + lfanew + 4))
            .is_some_and(|sig| sig == b"PE\0\0")
    }) || memmem::find(decoded, b"This program cannot be run in DOS mode").is_some()
}

pub fn inspect(data: &[u8]) -> Result<Value, AnalyzerError> {
    if !is_rtf(data) {
        return Err(AnalyzerError::analysis_failed("missing RTF header"));
    }

    let mut counts = [0usize; CONTROL_WORDS.len()];
    let mut objects: Vec<EmbeddedObject> = Vec::new();
    let mut pending_class: Option<String> = None;

    for m in CONTROL_MATCHER.find_iter(data) {
        if !ends_word(data, m.end()) {
            continue;
        }
        let index = m.pattern().as_usize();
        counts[index] += 1;
        match CONTROL_WORDS[index] {
            "\\object" => {
                objects.push(EmbeddedObject {
                    offset: m.start(),
                    ..EmbeddedObject::default()
                });
                pending_class = None;
            }
            "\\objclass" => {
                let class = read_class(data, m.end());
                match objects.last_mut() {
                    Some(obj) if obj.class_name.is_none() => obj.class_name = class,
                    _ => pending_class = class,
                }
            }
            "\\objdata" => {
                let (hex_length, decoded) = read_hex(data, m.end());
                if objects.last().map_or(true, |o| o.hex_length > 0) {
                    // \objdata outside any \object group
                    objects.push(EmbeddedObject {
                        offset: m.start(),
                        class_name: pending_class.take(),
                        ..EmbeddedObject::default()
                    });
                }
                if let Some(obj) = objects.last_mut() {
                    obj.hex_length = hex_length;
                    obj.decoded_size = decoded.len();
                    obj.is_ole2 = memmem::find(&decoded, OLE2_MAGIC).is_some();
                    obj.has_pe = has_pe(&decoded);
                }
            }
            _ => {}
        }
    }

    let control_words: serde_json::Map<String, Value> = CONTROL_WORDS
        .iter()
        .zip(counts)
        .map(|(word, count)| (word.trim_start_matches('\\').to_string(), json!(count)))
        .collect();
    let auto_update = counts[3] > 0;
    let executable = objects.iter().any(|o| o.has_pe);

    Ok(json!({
        "control_words": control_words,
        "object_count": objects.len(),
        "objects": objects,
        "auto_update": auto_update,
        "embedded_executable": executable,
        "suspicious": auto_update || executable || objects.iter().any(|o| o.is_ole2),
    }))
}

pub struct RtfInfo {
    ctx: AnalyzerContext,
}

impl RtfInfo {
    pub fn new(ctx: AnalyzerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Analyzer for RtfInfo {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        inspect(self.ctx.file()?.data())
    }
}
