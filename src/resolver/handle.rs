//! DOI handle service client.
//!
//! The handle API answers `GET /{doi}` with a JSON handle record. Its
//! `responseCode` is the handle system's own status, distinct from HTTP: `1`
//! means the handle exists. For a short-form DOI the record is an alias whose
//! value at index 1 holds the long DOI it points to.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::DEFAULT_HANDLE_URL;

use super::http_client::{Fetched, HttpTimeouts, build_lookup_http_client, fetch_json};
use super::{ResolveError, Resolution};

/// Handle system code for "handle found".
const HANDLE_FOUND: i64 = 1;

/// Handle record as returned by the handle API.
#[derive(Debug, Default, Clone, Deserialize)]
pub(crate) struct HandleRecord {
    #[serde(rename = "responseCode")]
    pub response_code: Option<i64>,
    pub handle: Option<String>,
    /// Echoed by the alias lookup of the shortDOI service.
    #[serde(rename = "ShortDOI")]
    pub short_doi: Option<String>,
    #[serde(default)]
    pub values: Vec<HandleValue>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub(crate) struct HandleValue {
    pub index: Option<i64>,
    pub data: Option<HandleData>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub(crate) struct HandleData {
    #[serde(default)]
    pub value: serde_json::Value,
}

impl HandleRecord {
    fn handle(&self) -> Option<&str> {
        self.handle.as_deref().map(str::trim).filter(|h| !h.is_empty())
    }

    /// Alias target: the entry with `index == 1`, else the second entry.
    fn alias_target(&self) -> Option<&str> {
        self.values
            .iter()
            .find(|value| value.index == Some(1))
            .or_else(|| self.values.get(1))
            .and_then(|value| value.data.as_ref())
            .and_then(|data| data.value.as_str())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Short operation on an identifier that is already short-form.
pub(crate) fn interpret_short_alias(fetched: Fetched<HandleRecord>) -> Resolution {
    match fetched {
        Fetched::Body(record) => [record.short_doi.as_deref(), record.handle()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map_or(Resolution::Invalid, |value| {
                Resolution::Resolved(value.to_lowercase())
            }),
        Fetched::Rejected => Resolution::Invalid,
        Fetched::Unavailable => Resolution::NetworkError,
    }
}

/// Long operation: short-form input reads the alias target, otherwise the
/// canonical handle.
pub(crate) fn interpret_long(fetched: Fetched<HandleRecord>, was_short: bool) -> Resolution {
    let record = match fetched {
        Fetched::Body(record) => record,
        Fetched::Rejected => return Resolution::Invalid,
        Fetched::Unavailable => return Resolution::NetworkError,
    };
    if record.response_code != Some(HANDLE_FOUND) {
        return Resolution::Invalid;
    }

    let long = if was_short {
        record.alias_target().or_else(|| record.handle())
    } else {
        record.handle()
    };
    long.map_or(Resolution::Invalid, |value| {
        Resolution::Resolved(value.to_lowercase())
    })
}

/// Check operation: compares the canonical handle with the stored value.
pub(crate) fn interpret_check(fetched: Fetched<HandleRecord>, stored: &str) -> Resolution {
    let record = match fetched {
        Fetched::Body(record) => record,
        Fetched::Rejected => return Resolution::Invalid,
        Fetched::Unavailable => return Resolution::NetworkError,
    };
    // Handle code 200 is "values not found". It is treated as invalid even
    // though the handle itself exists.
    if record.response_code == Some(200) {
        return Resolution::Invalid;
    }

    match record.handle() {
        None => Resolution::Invalid,
        Some(handle) if handle.eq_ignore_ascii_case(stored) => Resolution::Verified,
        Some(handle) => Resolution::Resolved(handle.to_lowercase()),
    }
}

/// Client for the DOI handle API.
#[derive(Debug, Clone)]
pub struct HandleClient {
    client: Client,
    base_url: String,
}

impl HandleClient {
    /// Creates a client against `doi.org`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if HTTP client construction fails.
    pub fn new() -> Result<Self, ResolveError> {
        Self::with_base_url(DEFAULT_HANDLE_URL, HttpTimeouts::default())
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if HTTP client construction fails.
    pub fn with_base_url(
        base_url: impl Into<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ResolveError> {
        Ok(Self {
            client: build_lookup_http_client("handle", timeouts)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, doi: &str) -> Fetched<HandleRecord> {
        let url = format!("{}/{}", self.base_url, urlencoding::encode(doi));
        fetch_json(&self.client, "handle", &url).await
    }

    /// Re-reads the short alias of an already short-form DOI.
    #[tracing::instrument(skip(self), fields(service = "handle"))]
    pub async fn short_alias(&self, doi: &str) -> Resolution {
        let resolution = interpret_short_alias(self.fetch(doi).await);
        debug!(?resolution, "Handle alias lookup finished");
        resolution
    }

    /// Expands a DOI to its long form.
    #[tracing::instrument(skip(self), fields(service = "handle"))]
    pub async fn lengthen(&self, doi: &str, was_short: bool) -> Resolution {
        let resolution = interpret_long(self.fetch(doi).await, was_short);
        debug!(?resolution, "Handle long lookup finished");
        resolution
    }

    /// Verifies a DOI against the value stored on the record.
    #[tracing::instrument(skip(self), fields(service = "handle"))]
    pub async fn verify(&self, doi: &str, stored: &str) -> Resolution {
        let resolution = interpret_check(self.fetch(doi).await, stored);
        debug!(?resolution, "Handle check lookup finished");
        resolution
    }
}
