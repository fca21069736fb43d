//! Reporter that remembers every call.

use std::sync::Mutex;

use super::{Notification, ProgressUpdate, Reporter};

/// One call made on a [`CollectingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Progress(ProgressUpdate),
    Close,
    Notify(Notification),
}

/// Keeps reporter calls in order for later inspection.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl CollectingReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: ReportEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// Every call so far.
    #[must_use]
    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Notifications only, in order.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::Notify(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Progress updates only, in order.
    #[must_use]
    pub fn progress_updates(&self) -> Vec<ProgressUpdate> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, ReportEvent::Close))
            .count()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Reporter for CollectingReporter {
    fn show_progress(&self, update: &ProgressUpdate) {
        self.push(ReportEvent::Progress(update.clone()));
    }

    fn close_progress(&self) {
        self.push(ReportEvent::Close);
    }

    fn notify(&self, notification: &Notification) {
        self.push(ReportEvent::Notify(notification.clone()));
    }
}
