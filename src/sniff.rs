//! Mimetype sniffing for file targets.
//!
//! Analyzer applicability is keyed on mimetypes, so the resolver needs one
//! stable label per file. Content wins over the file extension: a short
//! table of malware-relevant magics first (labels follow libmagic naming,
//! e.g. `application/x-dosexec`), then `infer`, then `mime_guess` on the
//! extension, then a printable-text heuristic.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Which sniffer produced the mimetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SniffSource {
    Magic,
    Infer,
    Extension,
    Heuristic,
}

/// Result of sniffing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimeHint {
    pub mimetype: String,
    pub source: SniffSource,
    /// Human readable label of the detected type, when known
    pub label: Option<String>,
}

impl MimeHint {
    fn new(mimetype: &str, source: SniffSource, label: Option<&str>) -> Self {
        Self {
            mimetype: mimetype.to_string(),
            source,
            label: label.map(str::to_string),
        }
    }
}

const MAGICS: &[(&[u8], &str, &str)] = &[
    (b"MZ", "application/x-dosexec", "pe"),
    (b"%PDF-", "application/pdf", "pdf"),
    (b"{\\rt", "text/rtf", "rtf"),
    (
        b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1",
        "application/msword",
        "ole2",
    ),
    (b"\x7fELF", "application/x-executable", "elf"),
];

/// Sniff a mimetype from content first, then the file name.
pub fn sniff(data: &[u8], file_name: Option<&str>) -> MimeHint {
    if let Some(hint) = sniff_magic(data) {
        return hint;
    }

    if let Some(kind) = infer::get(data) {
        info!(
            "Content detected as {} ({})",
            kind.mime_type(),
            kind.extension()
        );
        return MimeHint::new(kind.mime_type(), SniffSource::Infer, Some(kind.extension()));
    }

    if let Some(hint) = file_name.and_then(sniff_extension) {
        return hint;
    }

    debug!("No content type detected from {} bytes", data.len());
    sniff_text(data)
}

fn sniff_magic(data: &[u8]) -> Option<MimeHint> {
    MAGICS
        .iter()
        .find(|(magic, _, _)| data.starts_with(magic))
        .map(|(_, mime, label)| MimeHint::new(mime, SniffSource::Magic, Some(label)))
}

fn sniff_extension(file_name: &str) -> Option<MimeHint> {
    let extension = Path::new(file_name).extension()?.to_str()?;
    let mime = mime_guess::from_ext(extension).first()?;
    Some(MimeHint {
        mimetype: mime.essence_str().to_string(),
        source: SniffSource::Extension,
        label: Some(extension.to_ascii_lowercase()),
    })
}

fn sniff_text(data: &[u8]) -> MimeHint {
    let sample = &data[..data.len().min(4096)];
    let printable = sample
        .iter()
        .filter(|&&b| b.is_ascii_graphic() || b.is_ascii_whitespace())
        .count();
    if sample.is_empty() || printable * 100 / sample.len() < 95 {
        return MimeHint::new("application/octet-stream", SniffSource::Heuristic, None);
    }
    let lowered = String::from_utf8_lossy(sample).to_ascii_lowercase();
    if lowered.contains("<html") || lowered.contains("<!doctype html") {
        MimeHint::new("text/html", SniffSource::Heuristic, Some("html"))
    } else {
        MimeHint::new("text/plain", SniffSource::Heuristic, Some("text"))
    }
}

/// PE mimetypes as reported by libmagic, `infer` and extension mapping.
pub const PE_MIMETYPES: &[&str] = &[
    "application/x-dosexec",
    "application/vnd.microsoft.portable-executable",
    "application/x-msdownload",
    "application/x-ms-dos-executable",
];

/// Microsoft Office mimetypes (legacy OLE2 and OOXML).
pub const OFFICE_MIMETYPES: &[&str] = &[
    "application/msword",
    "application/vnd.ms-excel",
    "application/vnd.ms-powerpoint",
    "application/vnd.ms-office",
    "application/x-ole-storage",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.ms-word.document.macroenabled.12",
    "application/vnd.ms-excel.sheet.macroenabled.12",
];
