//! Workflow error taxonomy for batch runs.
//!
//! None of these is fatal: a batch always drains. They are collected on the
//! [`crate::batch::BatchSummary`] so hosts can show or log them.

use thiserror::Error;

use crate::mutation::{ErrorCategory, RecordOutcome, SkipReason};
use crate::record::RecordId;

/// Per-record and per-request problems observed during a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error(
        "record {record}: DOI is malformed or unknown to the resolver\n  Suggestion: Correct the DOI field or clear it to search by metadata"
    )]
    MalformedIdentifier { record: RecordId },

    #[error(
        "record {record}: no DOI found for its metadata\n  Suggestion: Check title, authors and year"
    )]
    IdentifierNotFound { record: RecordId },

    #[error(
        "record {record}: {candidates} possible DOIs found\n  Suggestion: Open the attached link and pick the right one"
    )]
    MultipleCandidates { record: RecordId, candidates: usize },

    #[error(
        "record {record}: lookup service unreachable; record skipped\n  Suggestion: Check your network connection and run the operation again"
    )]
    TransientNetworkError { record: RecordId },

    #[error("record {record}: item type '{item_type}' is not supported; record skipped")]
    UnsupportedRecordType { record: RecordId, item_type: String },

    #[error(
        "a batch is already running ({completed} of {total} done); request ignored\n  Suggestion: Wait for the running batch to finish"
    )]
    ConcurrentBatchRejected { completed: usize, total: usize },
}

impl BatchError {
    /// Error for a record outcome, if the outcome is a failure.
    ///
    /// `candidates` is only read for the multiple-DOI category.
    #[must_use]
    pub fn from_outcome(record: RecordId, outcome: &RecordOutcome, candidates: usize) -> Option<Self> {
        match outcome {
            RecordOutcome::Flagged(ErrorCategory::Invalid) => {
                Some(Self::MalformedIdentifier { record })
            }
            RecordOutcome::Flagged(ErrorCategory::NoDoi) => Some(Self::IdentifierNotFound { record }),
            RecordOutcome::Flagged(ErrorCategory::Multiple) => {
                Some(Self::MultipleCandidates { record, candidates })
            }
            RecordOutcome::Skipped(SkipReason::Network) => {
                Some(Self::TransientNetworkError { record })
            }
            RecordOutcome::Updated
            | RecordOutcome::Verified
            | RecordOutcome::Skipped(SkipReason::NoMetadata | SkipReason::CommitFailed) => None,
        }
    }
}
