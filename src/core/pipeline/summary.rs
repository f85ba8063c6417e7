//! Pipeline results

use crate::domain::chain::ChainStage;
use crate::domain::items::ItemKind;
use serde::Serialize;

/// What happened to one item during a submit pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The registry holds the item under this id
    Accepted(String),
    /// The registry refused a value; the item waits for corrected data
    Rejected(String),
    /// Nothing was sent
    Skipped(&'static str),
    /// A diagnostic chain stopped before this stage
    Incomplete(ChainStage),
}

/// Counters of ingest and submit passes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub failed: usize,
    pub skipped: usize,
    pub incomplete: usize,
    pub errors: Vec<String>,
}

impl PipelineSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Accepted(_) => self.accepted += 1,
            ItemOutcome::Rejected(_) => self.rejected += 1,
            ItemOutcome::Skipped(_) => self.skipped += 1,
            ItemOutcome::Incomplete(_) => self.incomplete += 1,
        }
    }

    /// Counts a failed item and keeps its error
    pub fn record_failure(&mut self, kind: ItemKind, natural_key: &str, error: impl std::fmt::Display) {
        self.failed += 1;
        self.errors.push(format!("{kind} '{natural_key}': {error}"));
    }

    pub fn merge(&mut self, other: PipelineSummary) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.incomplete += other.incomplete;
        self.errors.extend(other.errors);
    }

    /// Nothing failed during the pass
    pub fn is_successful(&self) -> bool {
        self.failed == 0 && self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_merge() {
        let mut a = PipelineSummary::new();
        a.record(&ItemOutcome::Accepted("x".to_string()));
        a.record(&ItemOutcome::Incomplete(ChainStage::Specimen));
        let mut b = PipelineSummary::new();
        b.record_failure(ItemKind::Condition, "D1", "timeout");
        a.merge(b);
        assert_eq!(a.accepted, 1);
        assert_eq!(a.incomplete, 1);
        assert_eq!(a.failed, 1);
        assert!(!a.is_successful());
        assert_eq!(a.errors, vec!["condition 'D1': timeout"]);
    }
}
