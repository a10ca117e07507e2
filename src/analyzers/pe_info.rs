//! PE_Info: headers, sections, imports and exports of a PE image.

use super::{Analyzer, AnalyzerContext};
use crate::core::errors::AnalyzerError;
use crate::entropy::rounded_entropy;
use async_trait::async_trait;
use chrono::DateTime;
use object::read::{Object, ObjectSection};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

const IMAGE_FILE_DLL: u16 = 0x2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeInfoParams {
    /// Imported functions listed in the report
    pub max_imports: usize,
}

impl Default for PeInfoParams {
    fn default() -> Self {
        Self { max_imports: 2048 }
    }
}

pub struct PeInfo {
    ctx: AnalyzerContext,
    params: PeInfoParams,
}

impl PeInfo {
    pub fn new(ctx: AnalyzerContext, params: PeInfoParams) -> Self {
        Self { ctx, params }
    }
}

#[derive(Debug, Serialize)]
struct SectionInfo {
    name: String,
    virtual_address: u64,
    virtual_size: u64,
    raw_size: u64,
    entropy: f64,
}

/// Fields read straight from the COFF file header.
struct CoffHeader {
    timestamp: u32,
    characteristics: u16,
}

fn coff_header(data: &[u8]) -> Option<CoffHeader> {
    let read_u16 = |off: usize| data.get(off..off + 2).map(|b| u16::from_le_bytes([b[0], b[1]]));
    let read_u32 =
        |off: usize| data.get(off..off + 4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));

    let e_lfanew = read_u32(0x3c)? as usize;
    if data.get(e_lfanew..e_lfanew + 4)? != b"PE\0\0" {
        return None;
    }
    let coff = e_lfanew + 4;
    Some(CoffHeader {
        timestamp: read_u32(coff + 4)?,
        characteristics: read_u16(coff + 18)?,
    })
}

/// pefile-style import hash: md5 over `lib.func` with the library
/// extension stripped, in import order.
pub fn imphash(imports: &[(String, String)]) -> Option<String> {
    if imports.is_empty() {
        return None;
    }
    let joined = imports
        .iter()
        .map(|(lib, func)| {
            let lib = lib.to_ascii_lowercase();
            let stem = ["dll", "ocx", "sys"]
                .iter()
                .find_map(|ext| lib.strip_suffix(&format!(".{}", ext)).map(str::to_string))
                .unwrap_or(lib);
            format!("{}.{}", stem, func.to_ascii_lowercase())
        })
        .collect::<Vec<_>>()
        .join(",");
    Some(format!("{:032x}", md5::compute(joined.as_bytes())))
}

fn inspect(data: &[u8], params: &PeInfoParams) -> Result<Value, AnalyzerError> {
    let obj = object::read::File::parse(data)
        .map_err(|e| AnalyzerError::analysis_failed(format!("not a parsable executable: {}", e)))?;
    if obj.format() != object::BinaryFormat::Pe {
        return Err(AnalyzerError::analysis_failed(format!(
            "expected a PE image, found {:?}",
            obj.format()
        )));
    }

    let header = coff_header(data);
    let compile_time = header
        .as_ref()
        .and_then(|h| DateTime::from_timestamp(i64::from(h.timestamp), 0))
        .map(|t| t.to_rfc3339());
    let is_dll = header
        .as_ref()
        .is_some_and(|h| h.characteristics & IMAGE_FILE_DLL != 0);

    let sections: Vec<SectionInfo> = obj
        .sections()
        .map(|s| {
            let raw = s.data().unwrap_or_default();
            SectionInfo {
                name: s.name().unwrap_or_default().to_string(),
                virtual_address: s.address(),
                virtual_size: s.size(),
                raw_size: s.file_range().map(|(_, size)| size).unwrap_or(0),
                entropy: rounded_entropy(raw),
            }
        })
        .collect();

    let all_imports: Vec<(String, String)> = obj
        .imports()
        .unwrap_or_default()
        .iter()
        .map(|imp| {
            (
                String::from_utf8_lossy(imp.library()).into_owned(),
                String::from_utf8_lossy(imp.name()).into_owned(),
            )
        })
        .collect();
    let mut imports: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (lib, func) in all_imports.iter().take(params.max_imports) {
        imports.entry(lib.to_ascii_lowercase()).or_default().push(func.clone());
    }

    let exports: Vec<Value> = obj
        .exports()
        .unwrap_or_default()
        .iter()
        .map(|e| {
            json!({
                "name": String::from_utf8_lossy(e.name()),
                "address": e.address(),
            })
        })
        .collect();

    let pdb_path = match obj.pdb_info() {
        Ok(Some(cv)) => Some(String::from_utf8_lossy(cv.path()).into_owned()),
        _ => None,
    };

    Ok(json!({
        "format": "PE",
        "architecture": format!("{:?}", obj.architecture()),
        "is_64bit": obj.is_64(),
        "is_dll": is_dll,
        "entrypoint": obj.entry(),
        "image_base": obj.relative_address_base(),
        "compile_time": compile_time,
        "sections": sections,
        "imports": imports,
        "import_count": all_imports.len(),
        "imports_truncated": all_imports.len() > params.max_imports,
        "exports": exports,
        "imphash": imphash(&all_imports),
        "pdb_path": pdb_path,
    }))
}

#[async_trait]
impl Analyzer for PeInfo {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        let file = self.ctx.file()?;
        inspect(file.data(), &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;

    #[test]
    fn imphash_strips_extensions() {
        let a = imphash(&[
            ("KERNEL32.dll".into(), "LoadLibraryA".into()),
            ("user32.dll".into(), "MessageBoxA".into()),
        ]);
        let b = imphash(&[
            ("kernel32".into(), "loadlibrarya".into()),
            ("USER32".into(), "messageboxa".into()),
        ]);
        assert_eq!(a, b);
        assert_eq!(a.unwrap().len(), 32);
        assert!(imphash(&[]).is_none());
    }

    #[test]
    fn non_pe_is_analysis_failure() {
        let err = inspect(b"MZ but truncated", &PeInfoParams::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AnalysisFailed);
        let err = inspect(b"\x7fELF", &PeInfoParams::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AnalysisFailed);
    }

    #[test]
    fn coff_header_needs_signature() {
        let mut data = vec![0u8; 0x100];
        data[0] = b'M';
        data[1] = b'Z';
        data[0x3c] = 0x80;
        assert!(coff_header(&data).is_none());
        data[0x80..0x84].copy_from_slice(b"PE\0\0");
        data[0x88..0x8c].copy_from_slice(&0x5f5e_1000u32.to_le_bytes());
        data[0x96..0x98].copy_from_slice(&IMAGE_FILE_DLL.to_le_bytes());
        let header = coff_header(&data).unwrap();
        assert_eq!(header.timestamp, 0x5f5e_1000);
        assert_ne!(header.characteristics & IMAGE_FILE_DLL, 0);
    }
}
