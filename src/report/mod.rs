//! Progress and error reporting for batch runs.
//!
//! The host UI is reached only through the [`Reporter`] trait. This module
//! decides *what* to say and *when*: one progress surface per batch, one
//! error notification per category per batch, at most one success summary.
//!
//! - [`TerminalReporter`] - `indicatif` progress bar plus logged notifications
//! - [`CollectingReporter`] - records every call, for tests and embedding

mod collecting;
mod terminal;

pub use collecting::{CollectingReporter, ReportEvent};
pub use terminal::TerminalReporter;

use std::time::Duration;

use tracing::info;

use crate::batch::{BatchState, Operation};
use crate::config::Preferences;
use crate::mutation::ErrorCategory;
use crate::record::Record;

/// Text shown on the progress surface before the first record.
pub const INITIAL_PROGRESS_TEXT: &str = "Checking DOIs.";

const ERROR_CLOSE_AFTER: Duration = Duration::from_millis(8000);
const SUCCESS_CLOSE_AFTER: Duration = Duration::from_millis(4000);
const UNSUPPORTED_CLOSE_AFTER: Duration = Duration::from_millis(6000);

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A transient message window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub headline: String,
    pub message: String,
    pub level: NotificationLevel,
    /// How long the host keeps it open.
    pub close_after: Duration,
}

/// State of the persistent per-batch progress surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub headline: String,
    pub text: String,
    /// 0..=100
    pub percent: u8,
}

/// Host UI contract.
pub trait Reporter: Send + Sync {
    /// Opens the progress surface, or updates it when already open.
    fn show_progress(&self, update: &ProgressUpdate);

    /// Closes the progress surface if open.
    fn close_progress(&self);

    /// Shows a standalone notification.
    fn notify(&self, notification: &Notification);
}

/// Progress headline for an operation.
#[must_use]
pub fn progress_headline(operation: Operation) -> &'static str {
    match operation {
        Operation::Short => "Getting shortDOIs",
        Operation::Long => "Getting long DOIs",
        Operation::Check => "Validating DOIs and removing extra text",
    }
}

/// Success summary for `count` successful records.
#[must_use]
pub fn success_notification(operation: Operation, count: usize) -> Notification {
    let message = match operation {
        Operation::Short => format!("shortDOIs updated for {count} items."),
        Operation::Long => format!("Long DOIs updated for {count} items."),
        Operation::Check => format!("DOIs verified for {count} items."),
    };
    Notification {
        headline: "Finished".to_string(),
        message,
        level: NotificationLevel::Success,
        close_after: SUCCESS_CLOSE_AFTER,
    }
}

/// Error notification for a category; `tag` is the configured tag name.
#[must_use]
pub fn error_notification(category: ErrorCategory, tag: &str) -> Notification {
    let (headline, plain, tagged) = match category {
        ErrorCategory::Invalid => (
            "Invalid DOI",
            "Invalid DOIs were found.",
            "Invalid DOIs were found. These have been tagged with",
        ),
        ErrorCategory::NoDoi => (
            "DOI not found",
            "No DOI was found for some items.",
            "No DOI was found for some items. These have been tagged with",
        ),
        ErrorCategory::Multiple => (
            "Multiple possible DOIs",
            "Some items had multiple possible DOIs.",
            "Some items had multiple possible DOIs. Links to lists of DOIs have been added and tagged with",
        ),
    };
    let message = if tag.is_empty() {
        plain.to_string()
    } else {
        format!("{tagged} '{tag}'.")
    };
    Notification {
        headline: headline.to_string(),
        message,
        level: NotificationLevel::Error,
        close_after: ERROR_CLOSE_AFTER,
    }
}

/// Aggregate warning for records of unsupported types, or `None` when there
/// are none. Type names are listed once each, in first-seen order.
#[must_use]
pub fn unsupported_types_notification(records: &[&Record]) -> Option<Notification> {
    if records.is_empty() {
        return None;
    }
    let mut types: Vec<&str> = Vec::new();
    for record in records {
        if !types.contains(&record.item_type()) {
            types.push(record.item_type());
        }
    }
    Some(Notification {
        headline: "Unsupported Item Types".to_string(),
        message: format!(
            "{} item(s) skipped (unsupported types: {})",
            records.len(),
            types.join(", ")
        ),
        level: NotificationLevel::Error,
        close_after: UNSUPPORTED_CLOSE_AFTER,
    })
}

/// Opens the progress surface for a new batch.
pub fn report_batch_opened(reporter: &dyn Reporter, operation: Operation) {
    reporter.show_progress(&ProgressUpdate {
        headline: progress_headline(operation).to_string(),
        text: INITIAL_PROGRESS_TEXT.to_string(),
        percent: 0,
    });
}

/// Updates the progress surface for the record at `position` (1-based).
pub fn report_progress(
    reporter: &dyn Reporter,
    operation: Operation,
    position: usize,
    total: usize,
    percent: u8,
) {
    reporter.show_progress(&ProgressUpdate {
        headline: progress_headline(operation).to_string(),
        text: format!("Item {position} of {total}"),
        percent,
    });
}

/// Emits the end-of-batch notifications and marks them shown on `state`.
///
/// With any error flag set, the progress surface closes and each category
/// not yet shown gets one notification. Otherwise a single success summary
/// is shown, once.
pub fn report_batch_summary(reporter: &dyn Reporter, state: &mut BatchState, prefs: &Preferences) {
    let Some(operation) = state.operation() else {
        return;
    };

    if state.errors_seen().any() {
        reporter.close_progress();
        for category in ErrorCategory::ALL {
            if state.errors_seen().get(category) && !state.errors_shown().get(category) {
                reporter.notify(&error_notification(category, category.tag_name(prefs)));
                state.mark_error_shown(category);
            }
        }
    } else if !state.final_summary_shown() {
        reporter.close_progress();
        reporter.notify(&success_notification(operation, state.success()));
        state.mark_final_summary_shown();
    }

    info!(
        operation = %operation,
        total = state.total(),
        success = state.success(),
        "Batch summary reported"
    );
}

/// Reports records skipped for their item type.
pub fn report_unsupported_types(reporter: &dyn Reporter, records: &[&Record]) {
    if let Some(notification) = unsupported_types_notification(records) {
        reporter.notify(&notification);
    }
}
