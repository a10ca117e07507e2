//! Write-once report slots for one job.

use crate::core::report::Report;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

/// One slot per analyzer name; the first write wins.
#[derive(Debug, Default)]
pub struct ReportSlots {
    slots: Mutex<HashMap<String, Report>>,
}

impl ReportSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `report` unless its slot is already filled.
    pub fn record(&self, report: Report) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.contains_key(report.analyzer_name()) {
            warn!(analyzer = %report.analyzer_name(), "Duplicate report discarded");
            return false;
        }
        slots.insert(report.analyzer_name().to_string(), report);
        true
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the slots in `names` order; unfilled names are skipped.
    pub fn take_ordered(&self, names: &[String]) -> Vec<Report> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        names.iter().filter_map(|name| slots.remove(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::report::ReportClock;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn first_write_wins() {
        let job = Uuid::new_v4();
        let slots = ReportSlots::new();
        assert!(slots.record(ReportClock::start("A", job).finish(Ok(json!(1)))));
        assert!(!slots.record(ReportClock::start("A", job).finish(Ok(json!(2)))));
        assert!(slots.record(ReportClock::start("B", job).finish(Ok(json!(3)))));
        assert_eq!(slots.len(), 2);

        let reports = slots.take_ordered(&["B".to_string(), "A".to_string()]);
        assert_eq!(reports[0].payload(), &json!(3));
        assert_eq!(reports[1].payload(), &json!(1));
        assert!(slots.is_empty());
    }
}
