//! Terminal rendering of batch progress.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use super::{Notification, NotificationLevel, ProgressUpdate, Reporter};

/// Draws the progress surface as an `indicatif` bar and prints
/// notifications to stderr.
///
/// When `enabled` is false (quiet mode or non-interactive output) no bar is
/// drawn; notifications still go to the log.
#[derive(Debug)]
pub struct TerminalReporter {
    enabled: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalReporter {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            bar: Mutex::new(None),
        }
    }

    fn new_bar() -> ProgressBar {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{prefix:.bold} [{bar:30}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    }
}

impl Reporter for TerminalReporter {
    fn show_progress(&self, update: &ProgressUpdate) {
        if !self.enabled {
            return;
        }
        if let Ok(mut slot) = self.bar.lock() {
            let bar = slot.get_or_insert_with(Self::new_bar);
            bar.set_prefix(update.headline.clone());
            bar.set_message(update.text.clone());
            bar.set_position(u64::from(update.percent));
        }
    }

    fn close_progress(&self) {
        if let Ok(mut slot) = self.bar.lock()
            && let Some(bar) = slot.take()
        {
            bar.finish_and_clear();
        }
    }

    fn notify(&self, notification: &Notification) {
        match notification.level {
            NotificationLevel::Success => {
                info!(headline = %notification.headline, "{}", notification.message);
            }
            NotificationLevel::Error => {
                error!(headline = %notification.headline, "{}", notification.message);
            }
        }
        if self.enabled {
            eprintln!("{}: {}", notification.headline, notification.message);
        }
    }
}
