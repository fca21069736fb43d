//! `SQLite`-backed record store.

use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::record::{LinkAttachment, Record, RecordId, TagType};

use super::{RecordStore, StoreError};

/// Record store over the library database.
///
/// A commit rewrites the record's fields and tags inside one transaction, so
/// a failed commit leaves the previously stored state untouched.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Adds a new record to the library and returns its id.
    ///
    /// This is a host-side operation: the resolution pipeline itself never
    /// creates records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self, fields), fields(item_type = %item_type))]
    pub async fn insert_record(
        &self,
        item_type: &str,
        fields: &[(String, String)],
    ) -> Result<RecordId, StoreError> {
        let mut tx = self.db.pool().begin().await?;

        let result = sqlx::query("INSERT INTO records (item_type) VALUES (?)")
            .bind(item_type)
            .execute(&mut *tx)
            .await?;
        let id = RecordId(result.last_insert_rowid());

        for (name, value) in fields {
            sqlx::query("INSERT INTO record_fields (record_id, name, value) VALUES (?, ?, ?)")
                .bind(id.0)
                .bind(name)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(record_id = %id, "Inserted record");
        Ok(id)
    }

    /// All record ids in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn list_ids(&self) -> Result<Vec<RecordId>, StoreError> {
        let rows = sqlx::query("SELECT id FROM records ORDER BY id")
            .fetch_all(self.db.pool())
            .await?;
        rows.iter()
            .map(|row| Ok(RecordId(row.try_get::<i64, _>("id")?)))
            .collect()
    }

    /// Link attachments stored under `parent`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn attachments_for(&self, parent: RecordId) -> Result<Vec<LinkAttachment>, StoreError> {
        let rows = sqlx::query(
            "SELECT url, title, content_type FROM attachments WHERE parent_id = ? ORDER BY id",
        )
        .bind(parent.0)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(LinkAttachment {
                    url: row.try_get("url")?,
                    title: row.try_get("title")?,
                    content_type: row.try_get("content_type")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    #[instrument(skip(self), fields(record_id = %id))]
    async fn load(&self, id: RecordId) -> Result<Record, StoreError> {
        let Some(row) =
            sqlx::query("SELECT item_type, is_regular, is_feed FROM records WHERE id = ?")
                .bind(id.0)
                .fetch_optional(self.db.pool())
                .await?
        else {
            return Err(StoreError::RecordNotFound(id));
        };

        let item_type: String = row.try_get("item_type")?;
        let mut record = Record::new(id, item_type);
        if row.try_get::<i64, _>("is_regular")? == 0 {
            record = record.non_regular();
        }
        if row.try_get::<i64, _>("is_feed")? != 0 {
            record = record.feed_item();
        }

        let fields = sqlx::query("SELECT name, value FROM record_fields WHERE record_id = ?")
            .bind(id.0)
            .fetch_all(self.db.pool())
            .await?;
        for field in &fields {
            let name: String = field.try_get("name")?;
            let value: String = field.try_get("value")?;
            record = record.with_field(name, value);
        }

        let tags = sqlx::query("SELECT name, tag_type FROM record_tags WHERE record_id = ?")
            .bind(id.0)
            .fetch_all(self.db.pool())
            .await?;
        for tag in &tags {
            let name: String = tag.try_get("name")?;
            if name.is_empty() {
                return Err(StoreError::Corrupt {
                    id,
                    reason: "empty tag name".to_string(),
                });
            }
            let tag_type = TagType::from_code(tag.try_get("tag_type")?);
            record = record.with_tag(name, tag_type);
        }

        Ok(record)
    }

    #[instrument(skip(self, record), fields(record_id = %record.id()))]
    async fn commit(&self, record: &Record) -> Result<(), StoreError> {
        let id = record.id().0;
        let mut tx = self.db.pool().begin().await?;

        let touched = sqlx::query("UPDATE records SET modified_at = datetime('now') WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(StoreError::RecordNotFound(record.id()));
        }

        sqlx::query("DELETE FROM record_fields WHERE record_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for (name, value) in record.fields() {
            sqlx::query("INSERT INTO record_fields (record_id, name, value) VALUES (?, ?, ?)")
                .bind(id)
                .bind(name)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM record_tags WHERE record_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for (name, tag_type) in record.tags() {
            sqlx::query("INSERT INTO record_tags (record_id, name, tag_type) VALUES (?, ?, ?)")
                .bind(id)
                .bind(name)
                .bind(tag_type.code())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("Committed record");
        Ok(())
    }

    #[instrument(skip(self, attachment), fields(record_id = %parent))]
    async fn link_attachment(
        &self,
        parent: RecordId,
        attachment: &LinkAttachment,
    ) -> Result<(), StoreError> {
        let exists = sqlx::query("SELECT 1 FROM records WHERE id = ?")
            .bind(parent.0)
            .fetch_optional(self.db.pool())
            .await?;
        if exists.is_none() {
            return Err(StoreError::RecordNotFound(parent));
        }

        sqlx::query(
            "INSERT INTO attachments (parent_id, url, title, content_type) VALUES (?, ?, ?, ?)",
        )
        .bind(parent.0)
        .bind(&attachment.url)
        .bind(&attachment.title)
        .bind(&attachment.content_type)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}
