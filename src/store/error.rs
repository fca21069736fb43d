//! Error types for record store operations.

use std::fmt;

use thiserror::Error;

use crate::record::RecordId;

/// Whether a database-backed store failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Connection pool timed out waiting for a free connection.
    PoolTimeout,
    /// Anything else; retrying will not help.
    Other,
}

impl StoreDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::Database(database_error)
                if matches!(
                    database_error.code().as_deref(),
                    Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
                ) =>
            {
                Self::BusyOrLocked
            }
            _ => Self::Other,
        }
    }

    /// Busy and pool-timeout failures clear up once other writers finish.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::BusyOrLocked | Self::PoolTimeout)
    }
}

impl fmt::Display for StoreDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::PoolTimeout => "pool_timeout",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

/// Errors that can occur while loading or committing records.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification of the failure.
        kind: StoreDbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// Record does not exist in the store.
    #[error(
        "record not found: id {0}\n  Suggestion: The record may have been deleted or the ID is incorrect"
    )]
    RecordNotFound(RecordId),

    /// Stored row could not be mapped to a record.
    #[error("corrupt record {id}: {reason}")]
    Corrupt {
        /// The record whose row was unreadable
        id: RecordId,
        /// What was wrong with it
        reason: String,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: StoreDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl StoreError {
    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<StoreDbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::RecordNotFound(_) | Self::Corrupt { .. } => None,
        }
    }

    /// True when the same write may succeed if tried again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.database_kind().is_some_and(StoreDbErrorKind::is_transient)
    }
}
