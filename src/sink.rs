//! Report sinks: where finished reports are emitted as structured records.
//!
//! The dispatcher emits each report as soon as its analyzer finishes. Sinks
//! do no persistence of their own beyond what the writer provides.

use crate::core::report::Report;
use crate::error::Result;
use std::io::Write;
use std::sync::Mutex;

pub trait ReportSink: Send + Sync {
    fn emit(&self, report: &Report) -> Result<()>;
}

/// Keeps every emitted report in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<Report>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports in emission order.
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ReportSink for MemorySink {
    fn emit(&self, report: &Report) -> Result<()> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report.clone());
        Ok(())
    }
}

/// One JSON document per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn emit(&self, report: &Report) -> Result<()> {
        let line = serde_json::to_vec(report)?;
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.write_all(&line)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
