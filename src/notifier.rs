//! "Records added" notifications and the auto-retrieve observer.
//!
//! Hosts call [`ItemNotifier::notify_added`] after importing records. Every
//! registered observer gets the event on its own listener task; each event is
//! handled on a freshly spawned task, so two imports in quick succession can
//! reach the coordinator while the first batch is still running. The
//! coordinator's guard drops the second one.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::batch::BatchCoordinator;
use crate::record::Record;

const DEFAULT_CAPACITY: usize = 64;

/// Records that were just added to the library.
#[derive(Debug, Clone)]
pub struct RecordsAdded {
    pub records: Vec<Record>,
}

/// Receiver side of [`ItemNotifier`].
#[async_trait]
pub trait ItemObserver: Send + Sync + 'static {
    async fn records_added(&self, records: Vec<Record>);
}

/// Fans "records added" events out to registered observers.
#[derive(Debug, Clone)]
pub struct ItemNotifier {
    tx: broadcast::Sender<RecordsAdded>,
}

impl Default for ItemNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ItemNotifier {
    /// `capacity` events may queue per observer before it starts lagging.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Starts delivering events to `observer` until the handle is
    /// unregistered or dropped.
    #[must_use = "dropping the handle unregisters the observer"]
    pub fn register_observer(&self, observer: Arc<dyn ItemObserver>) -> ObserverHandle {
        let mut rx = self.tx.subscribe();
        let task = tokio::spawn(async move {
            debug!("Item observer registered");
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let observer = Arc::clone(&observer);
                        tokio::spawn(async move { observer.records_added(event.records).await });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Item observer lagged; events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Item observer stopped");
        });
        ObserverHandle { task: Some(task) }
    }

    /// Stops `handle`'s listener and waits for it to exit.
    pub async fn unregister(&self, handle: ObserverHandle) {
        handle.unregister().await;
    }

    /// Publishes an added-records event. Returns how many observers will see it.
    pub fn notify_added(&self, records: Vec<Record>) -> usize {
        if records.is_empty() {
            return 0;
        }
        match self.tx.send(RecordsAdded { records }) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No item observers registered");
                0
            }
        }
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Registration token; dropping it stops the listener.
#[derive(Debug)]
pub struct ObserverHandle {
    task: Option<JoinHandle<()>>,
}

impl ObserverHandle {
    /// Stops the listener. Batches it already started run to completion.
    pub async fn unregister(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // Cancelled is the expected result.
            let _ = task.await;
        }
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Runs the configured auto-retrieve operation on added records.
#[derive(Debug, Clone)]
pub struct AutoRetrieve {
    coordinator: BatchCoordinator,
}

impl AutoRetrieve {
    #[must_use]
    pub fn new(coordinator: BatchCoordinator) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl ItemObserver for AutoRetrieve {
    async fn records_added(&self, records: Vec<Record>) {
        if let Some(start) = self.coordinator.auto_retrieve(records).await {
            debug!(?start, "Auto-retrieve finished");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::{Notify, mpsc};

    use crate::config::{InMemoryPreferenceSource, PreferenceCache, Preferences};
    use crate::record::{DOI_FIELD, RecordId};
    use crate::report::CollectingReporter;
    use crate::resolver::{CrossrefMatch, DoiLookup, Resolution};
    use crate::store::MemoryStore;

    struct Forward(mpsc::UnboundedSender<Vec<RecordId>>);

    #[async_trait]
    impl ItemObserver for Forward {
        async fn records_added(&self, records: Vec<Record>) {
            let _ = self.0.send(records.iter().map(Record::id).collect());
        }
    }

    #[tokio::test]
    async fn test_registered_observer_receives_added_records() {
        let notifier = ItemNotifier::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = notifier.register_observer(Arc::new(Forward(tx)));
        assert_eq!(notifier.observer_count(), 1);

        let delivered = notifier.notify_added(vec![Record::new(RecordId(7), "book")]);
        assert_eq!(delivered, 1);
        assert_eq!(rx.recv().await.unwrap(), vec![RecordId(7)]);

        notifier.unregister(handle).await;
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let notifier = ItemNotifier::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = notifier.register_observer(Arc::new(Forward(tx)));

        handle.unregister().await;
        assert_eq!(notifier.observer_count(), 0);
        assert_eq!(notifier.notify_added(vec![Record::new(RecordId(1), "book")]), 0);
    }

    #[tokio::test]
    async fn test_empty_event_is_not_sent() {
        let notifier = ItemNotifier::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let _handle = notifier.register_observer(Arc::new(Forward(tx)));
        assert_eq!(notifier.notify_added(Vec::new()), 0);
    }

    // ==================== Auto-retrieve through the notifier ====================

    /// Shortens every DOI to `10/done`, holding each lookup until released.
    #[derive(Default)]
    struct HeldLookup {
        entered: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    impl HeldLookup {
        async fn hold(&self) -> Resolution {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Resolution::Resolved("10/done".to_string())
        }
    }

    #[async_trait]
    impl DoiLookup for HeldLookup {
        async fn resolve_short(&self, _doi: &str) -> Resolution {
            self.hold().await
        }

        async fn resolve_long(&self, _doi: &str, _was_short: bool) -> Resolution {
            self.hold().await
        }

        async fn resolve_check(&self, _doi: &str, _stored: &str) -> Resolution {
            self.hold().await
        }

        async fn crossref_lookup(&self, _context: &str) -> CrossrefMatch {
            CrossrefMatch::Unresolved
        }
    }

    /// Signals after each auto-retrieve run returns.
    struct SignallingAutoRetrieve {
        inner: AutoRetrieve,
        done: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl ItemObserver for SignallingAutoRetrieve {
        async fn records_added(&self, records: Vec<Record>) {
            self.inner.records_added(records).await;
            let _ = self.done.send(());
        }
    }

    fn article(id: i64, doi: &str) -> Record {
        Record::new(RecordId(id), "journalArticle").with_field(DOI_FIELD, doi)
    }

    #[tokio::test]
    async fn test_back_to_back_imports_drop_second_auto_retrieve() {
        let first = article(1, "10.1000/first");
        let second = article(2, "10.1000/second");
        let store = Arc::new(MemoryStore::with_records([first.clone(), second.clone()]));
        let lookup = Arc::new(HeldLookup::default());
        let prefs = Arc::new(PreferenceCache::new(Arc::new(InMemoryPreferenceSource::new(
            Preferences::default(),
        ))));
        let coordinator = BatchCoordinator::new(
            store.clone(),
            lookup.clone(),
            Arc::new(CollectingReporter::new()),
            prefs,
        );

        let notifier = ItemNotifier::default();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let handle = notifier.register_observer(Arc::new(SignallingAutoRetrieve {
            inner: AutoRetrieve::new(coordinator.clone()),
            done: done_tx,
        }));

        assert_eq!(notifier.notify_added(vec![first]), 1);
        lookup.entered.notified().await;
        assert_eq!(notifier.notify_added(vec![second]), 1);

        // The first run is still held, so this signal is the second run.
        done_rx.recv().await.unwrap();
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        assert!(coordinator.snapshot().is_active());

        lookup.release.notify_one();
        done_rx.recv().await.unwrap();
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(RecordId(1)).unwrap().doi(), "10/done");
        assert_eq!(store.get(RecordId(2)).unwrap().doi(), "10.1000/second");
        assert!(!coordinator.snapshot().is_active());

        notifier.unregister(handle).await;
    }
}
