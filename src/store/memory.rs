//! In-process record store.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::record::{LinkAttachment, Record, RecordId};

use super::{RecordStore, StoreDbErrorKind, StoreError};

/// Record store that keeps everything in memory.
///
/// Counts commits so callers can assert how many writes a batch performed.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<RecordId, Record>>,
    attachments: Mutex<Vec<(RecordId, LinkAttachment)>>,
    commits: AtomicUsize,
    /// Commits left to fail; `usize::MAX` fails every one.
    failing_commits: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `records`.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Inserts or replaces a record as the host would.
    pub fn insert(&self, mut record: Record) {
        record.mark_clean();
        if let Ok(mut records) = self.records.lock() {
            records.insert(record.id(), record);
        }
    }

    /// Returns a copy of the stored record.
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<Record> {
        self.records.lock().ok()?.get(&id).cloned()
    }

    /// All record ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<RecordId> {
        self.records
            .lock()
            .map(|records| records.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Link attachments added under `parent`.
    #[must_use]
    pub fn attachments_for(&self, parent: RecordId) -> Vec<LinkAttachment> {
        self.attachments
            .lock()
            .map(|attachments| {
                attachments
                    .iter()
                    .filter(|(owner, _)| *owner == parent)
                    .map(|(_, attachment)| attachment.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of successful commits so far.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Makes every subsequent commit fail with a busy error.
    pub fn set_fail_commits(&self, fail: bool) {
        let count = if fail { usize::MAX } else { 0 };
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` commits fail with a busy error.
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    fn take_commit_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }

    fn poisoned() -> StoreError {
        StoreError::Database {
            kind: StoreDbErrorKind::Other,
            message: "memory store lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self, id: RecordId) -> Result<Record, StoreError> {
        self.records
            .lock()
            .map_err(|_| Self::poisoned())?
            .get(&id)
            .cloned()
            .ok_or(StoreError::RecordNotFound(id))
    }

    async fn commit(&self, record: &Record) -> Result<(), StoreError> {
        if self.take_commit_failure() {
            return Err(StoreError::Database {
                kind: StoreDbErrorKind::BusyOrLocked,
                message: "database is locked".to_string(),
            });
        }
        let mut records = self.records.lock().map_err(|_| Self::poisoned())?;
        if !records.contains_key(&record.id()) {
            return Err(StoreError::RecordNotFound(record.id()));
        }
        let mut stored = record.clone();
        stored.mark_clean();
        records.insert(stored.id(), stored);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn link_attachment(
        &self,
        parent: RecordId,
        attachment: &LinkAttachment,
    ) -> Result<(), StoreError> {
        if !self
            .records
            .lock()
            .map_err(|_| Self::poisoned())?
            .contains_key(&parent)
        {
            return Err(StoreError::RecordNotFound(parent));
        }
        self.attachments
            .lock()
            .map_err(|_| Self::poisoned())?
            .push((parent, attachment.clone()));
        Ok(())
    }
}
