//! File_Info: hashes, size, type and overall entropy.

use super::{Analyzer, AnalyzerContext};
use crate::core::errors::AnalyzerError;
use crate::entropy::{rounded_entropy, HIGH_ENTROPY_THRESHOLD};
use crate::hashing::{blake3_digest, sha256_digest, sha512_digest};
use crate::sniff::sniff;
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct FileInfo {
    ctx: AnalyzerContext,
}

impl FileInfo {
    pub fn new(ctx: AnalyzerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Analyzer for FileInfo {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        let file = self.ctx.file()?;
        let data = file.data();
        let file_name = file.file_name();
        let hint = sniff(data, Some(file_name.as_str()));
        let entropy = rounded_entropy(data);

        Ok(json!({
            "file_name": file_name,
            "size": data.len(),
            "md5": self.ctx.target.md5(),
            "sha256": sha256_digest(data),
            "sha512": sha512_digest(data),
            "blake3": blake3_digest(data),
            "mimetype": self.ctx.target.mimetype(),
            "detected_mimetype": hint.mimetype,
            "magic": hint.label,
            "entropy": entropy,
            "high_entropy": entropy >= HIGH_ENTROPY_THRESHOLD,
        }))
    }
}
