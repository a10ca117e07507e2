//! Strings_Info: printable strings and the indicators found in them.

use super::{Analyzer, AnalyzerContext};
use crate::core::errors::AnalyzerError;
use crate::strings::{extract_summary, StringsConfig};
use async_trait::async_trait;
use serde_json::Value;

pub struct StringsInfo {
    ctx: AnalyzerContext,
    config: StringsConfig,
}

impl StringsInfo {
    pub fn new(ctx: AnalyzerContext, config: StringsConfig) -> Self {
        Self { ctx, config }
    }
}

#[async_trait]
impl Analyzer for StringsInfo {
    fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    async fn analyze(&self) -> Result<Value, AnalyzerError> {
        let file = self.ctx.file()?;
        let mut guard = self.ctx.step_guard();
        let summary = extract_summary(file.data(), &self.config, &mut guard)?;
        serde_json::to_value(summary).map_err(|e| AnalyzerError::internal(e.to_string()))
    }
}
