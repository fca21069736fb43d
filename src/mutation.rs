//! Applies a [`Resolution`] to a record.
//!
//! Every path leaves at most one classification tag on the record: applying
//! a category first removes the other two. The applier only edits the
//! in-memory record; the coordinator commits when [`Record::is_dirty`] says
//! something changed.

use std::fmt;

use crate::config::Preferences;
use crate::record::{DOI_FIELD, LinkAttachment, Record, TagType};
use crate::resolver::Resolution;

/// Title of the discovery link added for ambiguous matches.
pub const DISCOVERY_LINK_TITLE: &str = "Multiple DOIs found";

/// Failure categories surfaced to the user once per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Invalid,
    NoDoi,
    Multiple,
}

impl ErrorCategory {
    pub const ALL: [Self; 3] = [Self::Invalid, Self::NoDoi, Self::Multiple];

    /// Configured tag name for this category; empty means disabled.
    #[must_use]
    pub fn tag_name(self, prefs: &Preferences) -> &str {
        match self {
            Self::Invalid => &prefs.tag_invalid,
            Self::NoDoi => &prefs.tag_nodoi,
            Self::Multiple => &prefs.tag_multiple,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Invalid => "invalid",
            Self::NoDoi => "no-doi",
            Self::Multiple => "multiple",
        })
    }
}

/// Why a record was left without a recorded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A lookup failed in transit.
    Network,
    /// No identifier and not enough metadata to search for one.
    NoMetadata,
    /// The store refused the commit.
    CommitFailed,
}

/// Result of processing one record; the coordinator steps once per outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The identifier was set or rewritten.
    Updated,
    /// The identifier was confirmed unchanged.
    Verified,
    /// A classification tag was applied.
    Flagged(ErrorCategory),
    /// Nothing recorded for this record.
    Skipped(SkipReason),
}

impl RecordOutcome {
    /// Counts toward the success summary.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Updated | Self::Verified)
    }
}

/// What the coordinator still has to do after applying a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub outcome: RecordOutcome,
    /// Link to hang off the record before committing.
    pub attachment: Option<LinkAttachment>,
}

impl Mutation {
    fn outcome(outcome: RecordOutcome) -> Self {
        Self {
            outcome,
            attachment: None,
        }
    }
}

/// Applies `resolution` to `record` using the batch's tag names.
pub fn apply(record: &mut Record, resolution: Resolution, prefs: &Preferences) -> Mutation {
    match resolution {
        Resolution::Resolved(value) => {
            record.set_field(DOI_FIELD, value.to_lowercase());
            clear_classification_tags(record, prefs);
            Mutation::outcome(RecordOutcome::Updated)
        }
        Resolution::Verified => {
            clear_classification_tags(record, prefs);
            Mutation::outcome(RecordOutcome::Verified)
        }
        Resolution::Invalid => {
            classify(record, ErrorCategory::Invalid, prefs);
            Mutation::outcome(RecordOutcome::Flagged(ErrorCategory::Invalid))
        }
        Resolution::Unresolved => {
            classify(record, ErrorCategory::NoDoi, prefs);
            Mutation::outcome(RecordOutcome::Flagged(ErrorCategory::NoDoi))
        }
        Resolution::MultiResolved { discovery_url, .. } => {
            classify(record, ErrorCategory::Multiple, prefs);
            Mutation {
                outcome: RecordOutcome::Flagged(ErrorCategory::Multiple),
                attachment: Some(LinkAttachment::html(discovery_url, DISCOVERY_LINK_TITLE)),
            }
        }
        Resolution::NetworkError => Mutation::outcome(RecordOutcome::Skipped(SkipReason::Network)),
    }
}

/// Record with no identifier and no searchable metadata: drop a stale
/// invalid tag, nothing else.
pub fn apply_no_metadata(record: &mut Record, prefs: &Preferences) -> Mutation {
    record.remove_tag(&prefs.tag_invalid);
    Mutation::outcome(RecordOutcome::Skipped(SkipReason::NoMetadata))
}

/// Removes all three classification tags.
pub fn clear_classification_tags(record: &mut Record, prefs: &Preferences) {
    for category in ErrorCategory::ALL {
        record.remove_tag(category.tag_name(prefs));
    }
}

/// True when any classification tag is present.
#[must_use]
pub fn has_classification_tag(record: &Record, prefs: &Preferences) -> bool {
    ErrorCategory::ALL
        .iter()
        .any(|category| record.has_tag(category.tag_name(prefs)))
}

fn classify(record: &mut Record, category: ErrorCategory, prefs: &Preferences) {
    for other in ErrorCategory::ALL {
        if other != category {
            record.remove_tag(other.tag_name(prefs));
        }
    }
    // add_tag ignores the empty name of a disabled category
    record.add_tag(category.tag_name(prefs), TagType::Automatic);
}
