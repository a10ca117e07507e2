//! Signature_Info: Authenticode certificate table of a PE image.
//!
//! Reads the security data directory and walks its `WIN_CERTIFICATE`
//! entries. No chain validation happens here; the report describes what is
//! embedded and whether the table is structurally sound.

use super::{Analyzer, AnalyzerContext};
use crate::core::errors::AnalyzerError;
use async_trait::async_trait;
use memchr::memmem;
use object::FileKind;
use serde::Serialize;
use serde_json::{json, Value};

const IMAGE_DIRECTORY_ENTRY_SECURITY: usize = 4;
const WIN_CERT_TYPE_X509: u16 = 0x0001;
const WIN_CERT_TYPE_PKCS_SIGNED_DATA: u16 = 0x0002;
const WIN_CERT_TYPE_TS_STACK_SIGNED: u16 = 0x0004;
const WIN_CERTIFICATE_HEADER: usize = 8;

/// DER encoding of OID 1.2.840.113549.1.7.2 (PKCS#7 signedData)
const SIGNED_DATA_OID: &[u8] = &[0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];

pub struct SignatureInfo {
    ctx: AnalyzerContext,
}

impl SignatureInfo {
    pub fn new(ctx: AnalyzerContext) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Serialize)]
struct CertificateEntry {
    offset: usize,
    length: u32,
    revision: String,
    certificate_type: &'static str,
    /// DER blob is a PKCS#7 signedData structure
    pkcs7_signed_data: bool,
}

fn read_u16(data: &[u8], off: usize) -> Option<u16> {
    data.get(off..off + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], off: usize) -> Option<u32> {
    data.get(off..off + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// File offset and size of the certificate table, if the directory exists.
///
/// Unlike every other data directory, the security entry holds a file
/// offset rather than an RVA.
fn security_directory(data: &[u8], pe64: bool) -> Option<(u32, u32)> {
    let e_lfanew = read_u32(data, 0x3c)? as usize;
    let optional = e_lfanew + 4 + 20;
    let (count_at, dirs_at) = if pe64 { (108, 112) } else { (92, 96) };
    let count = read_u32(data, optional + count_at)? as usize;
    if count <= IMAGE_DIRECTORY_ENTRY_SECURITY {
        return None;
    }
    let entry = optional + dirs_at + IMAGE_DIRECTORY_ENTRY_SECURITY * 8;
    Some((read_u32(data, entry)?, read_u32(data, entry + 4)?))
}

fn certificate_type(value: u16) -> &'static str {
    match value {
        WIN_CERT_TYPE_X509 => "x509",
        WIN_CERT_TYPE_PKCS_SIGNED_DATA => "pkcs_signed_data",
        WIN_CERT_TYPE_TS_STACK_SIGNED => "ts_stack_signed",
        _ => "unknown",
    }
}

/// Walk the 8-byte aligned `WIN_CERTIFICATE` entries of `table`.
///
/// Returns the entries read and whether the walk hit a malformed entry.
fn certificate_entries(table: &[u8], base: usize) -> (Vec<CertificateEntry>, bool) {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos + WIN_CERTIFICATE_HEADER <= table.len() {
        let (Some(length), Some(revision), Some(kind)) =
            (read_u32(table, pos), read_u16(table, pos + 4), read_u16(table, pos + 6))
        else {
            return (entries, true);
        };
        let end = pos + length as usize;
        if (length as usize) < WIN_CERTIFICATE_HEADER || end > table.len() {
            return (entries, true);
        }
        let blob = &table[pos + WIN_CERTIFICATE_HEADER..end];
        entries.push(CertificateEntry {
            offset: base + pos,
            length,
            revision: format!("{}.{}", revision >> 8, revision & 0xff),
            certificate_type: certificate_type(kind),
            pkcs7_signed_data: kind == WIN_CERT_TYPE_PKCS_SIGNED_DATA
                && blob.first() == Some(&0x30)
                && memmem::find(blob, SIGNED_DATA_OID).is_some(),
        });
        pos = (end + 7) & !7;
    }
    // Anything left over is shorter than a header.
    let trailing = table.len().saturating_sub(pos);
    (entries, trailing != 0 && table[pos..].iter().any(|&b| b != 0))
}

fn inspect(data: &[u8]) -> Result<Value, AnalyzerError> {
    let pe64 = match FileKind::parse(data) {
        Ok(FileKind::Pe32) => false,
        Ok(FileKind::Pe64) => true,
        Ok(other) => {
            return Err(AnalyzerError::analysis_failed(format!(
                "expected a PE image, found {:?}",
                other
            )))
        }
        Err(e) => return Err(AnalyzerError::analysis_failed(format!("not a PE image: {}", e))),
    };

    let directory = security_directory(data, pe64).filter(|&(offset, size)| offset != 0 && size != 0);
    let Some((offset, size)) = directory else {
        return Ok(json!({
            "signed": false,
            "certificate_table": null,
            "certificates": [],
            "pkcs7": false,
            "corrupted": false,
        }));
    };

    let (start, len) = (offset as usize, size as usize);
    let Some(table) = data.get(start..start.saturating_add(len)) else {
        return Ok(json!({
            "signed": true,
            "certificate_table": {"offset": offset, "size": size, "at_end_of_file": false},
            "certificates": [],
            "pkcs7": false,
            "corrupted": true,
        }));
    };

    let (certificates, corrupted) = certificate_entries(table, start);
    let pkcs7 = certificates.iter().any(|c| c.pkcs7_signed_data);
    Ok(json!({
        "signed": true,
        "certificate_table": {
            "offset": offset,
            "size": size,
            "at_end_of_file": start + len == data.len(),
        },
        "certificates": certificates,
        "pkcs7": pkcs7,
        "corrupted": corrupted || certificates.is_empty(),
    }))
}

#[async_trait]
impl Analyzer for SignatureInfo {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        let file = self.ctx.file()?;
        inspect(file.data())
    }
}
