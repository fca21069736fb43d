//! Host record store contract and the two stores shipped with the crate.
//!
//! The batch pipeline only needs four things from a host library: load the
//! records it was asked to process, commit one record atomically, and hang a
//! link attachment off a record. [`RecordStore`] captures exactly that.
//!
//! - [`SqliteStore`] - `SQLite`-backed library used by the CLI
//! - [`MemoryStore`] - in-process store for tests and embedding

mod error;
mod memory;
mod sqlite;

pub use error::{StoreDbErrorKind, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::record::{LinkAttachment, Record, RecordId};

/// Capability set the pipeline requires from the host library.
///
/// Commits are awaited before the batch advances, so an implementation may
/// assume no two commits for the same record overlap.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Loads a single record.
    async fn load(&self, id: RecordId) -> Result<Record, StoreError>;

    /// Loads several records, preserving the requested order.
    ///
    /// The default implementation loads one at a time.
    async fn load_many(&self, ids: &[RecordId]) -> Result<Vec<Record>, StoreError> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            records.push(self.load(*id).await?);
        }
        Ok(records)
    }

    /// Persists fields and tags of `record` in one transaction.
    async fn commit(&self, record: &Record) -> Result<(), StoreError>;

    /// Adds a linked-URL attachment under `parent`.
    async fn link_attachment(
        &self,
        parent: RecordId,
        attachment: &LinkAttachment,
    ) -> Result<(), StoreError>;
}
