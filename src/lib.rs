//! DOI Manager Core Library
//!
//! Resolves and normalizes DOIs for batches of bibliographic records. Each
//! record's stored identifier is cleaned, looked up against shortDOI, the DOI
//! handle API or Crossref, and the record is updated or tagged with the
//! result.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`identifier`] - DOI cleaning and short/long classification
//! - [`resolver`] - lookup clients producing a [`Resolution`]
//! - [`mutation`] - applies a resolution to a record
//! - [`batch`] - single-batch coordinator and its state
//! - [`report`] - progress surface and notifications
//! - [`record`], [`store`], [`db`] - record model and host stores
//! - [`config`] - tag names, auto-retrieve mode, service endpoints
//! - [`notifier`] - "records added" observers and auto-retrieve

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod config;
pub mod db;
pub mod error;
pub mod identifier;
pub mod mutation;
pub mod notifier;
pub mod record;
pub mod report;
pub mod resolver;
pub mod store;
pub(crate) mod user_agent;

#[cfg(test)]
pub mod test_support;

// Re-export commonly used types
pub use batch::{BatchCoordinator, BatchPhase, BatchStart, BatchState, BatchSummary, Operation};
pub use config::{
    AutoRetrieveMode, ConfigError, FilePreferenceSource, InMemoryPreferenceSource, LoadedConfig,
    PreferenceCache, PreferenceSource, Preferences, ServiceSettings, load_config,
};
pub use db::{Database, DbError};
pub use error::BatchError;
pub use identifier::{IdentifierClass, classify, clean_doi, is_short_form};
pub use mutation::{ErrorCategory, RecordOutcome, SkipReason};
pub use notifier::{AutoRetrieve, ItemNotifier, ItemObserver, ObserverHandle};
pub use record::{DOI_FIELD, LinkAttachment, Record, RecordId, TagType};
pub use report::{
    CollectingReporter, Notification, NotificationLevel, ProgressUpdate, Reporter,
    TerminalReporter,
};
pub use resolver::{
    CrossrefClient, CrossrefMatch, DoiLookup, HandleClient, HttpTimeouts, Resolution,
    ResolveError, ResolverClient, ShortDoiClient,
};
pub use store::{MemoryStore, RecordStore, SqliteStore, StoreError};
