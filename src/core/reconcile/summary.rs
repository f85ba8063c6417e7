//! Sweep summary and reporting

use crate::core::pipeline::summary::PipelineSummary;
use crate::domain::events::SweepKind;
use serde::Serialize;
use std::time::Duration;

/// Category of a sweep error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepErrorType {
    Encounter,
    Items,
    Duplicate,
    Storage,
}

/// An error recorded during a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepError {
    pub error_type: SweepErrorType,
    pub message: String,
    /// Record the error relates to, e.g. `encounter=<id>`
    pub context: Option<String>,
}

impl SweepError {
    pub fn new(error_type: SweepErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Summary of one reconciliation run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub sweep: SweepKind,
    pub encounters_examined: usize,
    pub encounters_submitted: usize,
    pub encounters_not_ready: usize,
    pub encounters_skipped: usize,
    pub encounters_failed: usize,
    pub duplicates_recorded: usize,
    pub duplicates_resolved: usize,
    pub duplicates_failed: usize,
    pub items: PipelineSummary,
    /// Stopped early by a shutdown signal
    pub interrupted: bool,
    #[serde(skip)]
    pub duration: Duration,
    pub errors: Vec<SweepError>,
}

impl SweepSummary {
    pub fn new(sweep: SweepKind) -> Self {
        Self {
            sweep,
            encounters_examined: 0,
            encounters_submitted: 0,
            encounters_not_ready: 0,
            encounters_skipped: 0,
            encounters_failed: 0,
            duplicates_recorded: 0,
            duplicates_resolved: 0,
            duplicates_failed: 0,
            items: PipelineSummary::new(),
            interrupted: false,
            duration: Duration::from_secs(0),
            errors: Vec::new(),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn add_error(&mut self, error: SweepError) {
        self.errors.push(error);
    }

    /// Folds a sub-sweep into this one
    pub fn merge(&mut self, other: SweepSummary) {
        self.encounters_examined += other.encounters_examined;
        self.encounters_submitted += other.encounters_submitted;
        self.encounters_not_ready += other.encounters_not_ready;
        self.encounters_skipped += other.encounters_skipped;
        self.encounters_failed += other.encounters_failed;
        self.duplicates_recorded += other.duplicates_recorded;
        self.duplicates_resolved += other.duplicates_resolved;
        self.duplicates_failed += other.duplicates_failed;
        self.items.merge(other.items);
        self.interrupted |= other.interrupted;
        self.errors.extend(other.errors);
    }

    /// No encounter, item or duplicate failed
    pub fn is_successful(&self) -> bool {
        self.encounters_failed == 0
            && self.duplicates_failed == 0
            && self.items.is_successful()
            && self.errors.is_empty()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            sweep = %self.sweep,
            encounters_examined = self.encounters_examined,
            encounters_submitted = self.encounters_submitted,
            encounters_not_ready = self.encounters_not_ready,
            encounters_failed = self.encounters_failed,
            duplicates_resolved = self.duplicates_resolved,
            items_accepted = self.items.accepted,
            items_rejected = self.items.rejected,
            items_failed = self.items.failed,
            interrupted = self.interrupted,
            duration_ms = self.duration.as_millis() as u64,
            "Reconciliation completed"
        );

        if !self.errors.is_empty() {
            tracing::warn!(error_count = self.errors.len(), "Reconciliation completed with errors");
            for error in &self.errors {
                tracing::warn!(
                    error_type = ?error.error_type,
                    message = %error.message,
                    context = error.context.as_deref().unwrap_or(""),
                    "Reconciliation error"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_summary_is_successful() {
        let summary = SweepSummary::new(SweepKind::All);
        assert!(summary.is_successful());
        assert!(!summary.interrupted);
    }

    #[test]
    fn test_merge_keeps_errors_and_interrupt() {
        let mut all = SweepSummary::new(SweepKind::All);
        let mut part = SweepSummary::new(SweepKind::Duplicates);
        part.duplicates_failed = 1;
        part.interrupted = true;
        part.add_error(
            SweepError::new(SweepErrorType::Duplicate, "rejected").with_context("encounter=e1"),
        );
        all.merge(part);
        assert!(all.interrupted);
        assert_eq!(all.duplicates_failed, 1);
        assert_eq!(all.errors[0].context.as_deref(), Some("encounter=e1"));
        assert!(!all.is_successful());
    }
}
