//! Record value type: one bibliographic entry as the host store hands it over.
//!
//! The pipeline never creates or destroys records. It reads fields, changes
//! the `DOI` field and classification tags, and asks the store to commit.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the field holding the stored identifier.
pub const DOI_FIELD: &str = "DOI";

/// Item types the pipeline processes. Anything else is reported and skipped.
pub const SUPPORTED_ITEM_TYPES: [&str; 15] = [
    "journalArticle",
    "conferencePaper",
    "book",
    "bookSection",
    "report",
    "thesis",
    "preprint",
    "dataset",
    "document",
    "presentation",
    "standard",
    "encyclopediaArticle",
    "dictionaryEntry",
    "magazineArticle",
    "newspaperArticle",
];

/// Returns true when `item_type` is on the supported allow-list.
#[must_use]
pub fn is_supported_type(item_type: &str) -> bool {
    SUPPORTED_ITEM_TYPES.contains(&item_type)
}

/// Stable identifier assigned by the host store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a tag was attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagType {
    /// Added by a person.
    Manual = 0,
    /// Added by a tool; classification tags are always automatic.
    Automatic = 1,
}

impl TagType {
    /// Numeric code used by the store.
    #[must_use]
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Maps a stored numeric code back to a tag type; unknown codes are manual.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        if code == 1 { Self::Automatic } else { Self::Manual }
    }
}

/// A linked-URL attachment requested by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAttachment {
    pub url: String,
    pub title: String,
    pub content_type: String,
}

impl LinkAttachment {
    /// Creates a link attachment with an HTML content type.
    #[must_use]
    pub fn html(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content_type: "text/html".to_string(),
        }
    }
}

/// One bibliographic entry loaded from the host store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    id: RecordId,
    item_type: String,
    regular: bool,
    feed: bool,
    fields: BTreeMap<String, String>,
    tags: BTreeMap<String, TagType>,
    #[serde(skip)]
    dirty: bool,
}

impl Record {
    /// Creates a regular, non-feed record with no fields or tags.
    #[must_use]
    pub fn new(id: RecordId, item_type: impl Into<String>) -> Self {
        Self {
            id,
            item_type: item_type.into(),
            regular: true,
            feed: false,
            fields: BTreeMap::new(),
            tags: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Builder: sets a field without marking the record dirty.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder: adds a tag without marking the record dirty.
    #[must_use]
    pub fn with_tag(mut self, name: impl Into<String>, tag_type: TagType) -> Self {
        self.tags.insert(name.into(), tag_type);
        self
    }

    /// Builder: marks the record as a non-regular entry (note, attachment).
    #[must_use]
    pub fn non_regular(mut self) -> Self {
        self.regular = false;
        self
    }

    /// Builder: marks the record as a feed entry.
    #[must_use]
    pub fn feed_item(mut self) -> Self {
        self.feed = true;
        self
    }

    #[must_use]
    pub fn id(&self) -> RecordId {
        self.id
    }

    #[must_use]
    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    /// True for ordinary bibliographic entries (not notes or attachments).
    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.regular
    }

    #[must_use]
    pub fn is_feed(&self) -> bool {
        self.feed
    }

    /// Returns the field value, or `None` when missing.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Returns the stored identifier, or an empty string when missing.
    #[must_use]
    pub fn doi(&self) -> &str {
        self.get_field(DOI_FIELD).unwrap_or("")
    }

    /// Sets a field. Returns true when the value changed.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.fields.get(name) == Some(&value) {
            return false;
        }
        self.fields.insert(name.to_string(), value);
        self.dirty = true;
        true
    }

    /// Adds a tag. Empty names are ignored. Returns true when the tag was new.
    pub fn add_tag(&mut self, name: &str, tag_type: TagType) -> bool {
        if name.is_empty() || self.tags.contains_key(name) {
            return false;
        }
        self.tags.insert(name.to_string(), tag_type);
        self.dirty = true;
        true
    }

    /// Removes a tag. Returns true when it was present.
    pub fn remove_tag(&mut self, name: &str) -> bool {
        if self.tags.remove(name).is_some() {
            self.dirty = true;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn has_tag(&self, name: &str) -> bool {
        !name.is_empty() && self.tags.contains_key(name)
    }

    /// Iterates tag names with their type.
    pub fn tags(&self) -> impl Iterator<Item = (&str, TagType)> {
        self.tags.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    /// Iterates fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Sorted tag names, mainly for display.
    #[must_use]
    pub fn tag_names(&self) -> BTreeSet<&str> {
        self.tags.keys().map(String::as_str).collect()
    }

    /// True when fields or tags changed since load or the last commit.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears the dirty flag; stores call this after a successful commit.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
