//! Counters and flags of the active batch.

use crate::mutation::{ErrorCategory, RecordOutcome};
use crate::record::RecordId;

use super::Operation;

/// Lifecycle of the coordinator's batch slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchPhase {
    #[default]
    Idle,
    Running,
    /// Every record has stepped; summaries are being emitted.
    Draining,
}

/// One boolean per [`ErrorCategory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryFlags {
    invalid: bool,
    nodoi: bool,
    multiple: bool,
}

impl CategoryFlags {
    #[must_use]
    pub fn get(self, category: ErrorCategory) -> bool {
        match category {
            ErrorCategory::Invalid => self.invalid,
            ErrorCategory::NoDoi => self.nodoi,
            ErrorCategory::Multiple => self.multiple,
        }
    }

    pub fn set(&mut self, category: ErrorCategory) {
        match category {
            ErrorCategory::Invalid => self.invalid = true,
            ErrorCategory::NoDoi => self.nodoi = true,
            ErrorCategory::Multiple => self.multiple = true,
        }
    }

    #[must_use]
    pub fn any(self) -> bool {
        self.invalid || self.nodoi || self.multiple
    }
}

/// State of one batch run.
///
/// `current` is `None` before the first record is dispatched and only ever
/// moves forward. `completed` never exceeds `total`. A default (idle) state
/// has `total == 0`, so it never blocks a new batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchState {
    operation: Option<Operation>,
    records: Vec<RecordId>,
    phase: BatchPhase,
    current: Option<usize>,
    completed: usize,
    success: usize,
    errors_seen: CategoryFlags,
    errors_shown: CategoryFlags,
    final_summary_shown: bool,
}

impl BatchState {
    /// Fresh running state for `records`.
    #[must_use]
    pub fn started(operation: Operation, records: Vec<RecordId>) -> Self {
        Self {
            operation: Some(operation),
            records,
            phase: BatchPhase::Running,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn operation(&self) -> Option<Operation> {
        self.operation
    }

    #[must_use]
    pub fn records(&self) -> &[RecordId] {
        &self.records
    }

    #[must_use]
    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Index of the record being processed, if any has been dispatched.
    #[must_use]
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    #[must_use]
    pub fn success(&self) -> usize {
        self.success
    }

    /// True while records remain; a new batch is refused then.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.completed < self.total()
    }

    #[must_use]
    pub fn errors_seen(&self) -> CategoryFlags {
        self.errors_seen
    }

    #[must_use]
    pub fn errors_shown(&self) -> CategoryFlags {
        self.errors_shown
    }

    pub fn mark_error_shown(&mut self, category: ErrorCategory) {
        self.errors_shown.set(category);
    }

    #[must_use]
    pub fn final_summary_shown(&self) -> bool {
        self.final_summary_shown
    }

    pub fn mark_final_summary_shown(&mut self) {
        self.final_summary_shown = true;
    }

    /// Completion percentage, rounded half up.
    #[must_use]
    pub fn percent(&self) -> u8 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        u8::try_from((self.completed * 100 + total / 2) / total).unwrap_or(100)
    }

    /// Moves to the next record and returns its index.
    pub fn advance(&mut self) -> usize {
        let next = self.current.map_or(0, |index| index + 1);
        self.current = Some(next);
        next
    }

    /// Folds a record outcome into the success counter or error flags.
    pub fn record_outcome(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Updated | RecordOutcome::Verified => self.success += 1,
            RecordOutcome::Flagged(category) => self.errors_seen.set(*category),
            RecordOutcome::Skipped(_) => {}
        }
    }

    /// Counts one record as done. Returns true when that was the last one,
    /// leaving the state in [`BatchPhase::Draining`].
    pub fn complete_one(&mut self) -> bool {
        if self.completed < self.total() {
            self.completed += 1;
        }
        if self.completed == self.total() {
            self.phase = BatchPhase::Draining;
            true
        } else {
            false
        }
    }
}
