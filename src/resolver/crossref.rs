//! Crossref OpenURL lookup: finds DOIs for records that have none.
//!
//! The [`CrossrefClient`] sends the record's OpenURL context object to the
//! Crossref OpenURL endpoint with `multihit=true` and reads the XML answer.
//! The `status` attribute of the `<query>` element decides the outcome:
//!
//! - `resolved`: exactly one DOI; the caller feeds it back into the operation
//! - `unresolved`: nothing matched
//! - `multiresolved`: several candidates; a discovery link is produced
//!
//! # Polite usage
//!
//! Every request carries a `pid` contact address.

use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::{DEFAULT_CROSSREF_EMAIL, DEFAULT_CROSSREF_URL};

use super::http_client::{Fetched, HttpTimeouts, build_lookup_http_client, fetch_text};
use super::ResolveError;

// ==================== Lookup Outcome ====================

/// What Crossref answered for one context object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossrefMatch {
    /// A single DOI was found.
    Resolved(String),
    /// No DOI matched the metadata.
    Unresolved,
    /// Several DOIs matched.
    MultiResolved {
        /// Crossref query listing every candidate.
        discovery_url: String,
        /// Candidate DOIs in response order.
        candidates: Vec<String>,
    },
    /// Transport failure, non-200 status, unreadable XML or unknown status.
    NetworkError,
}

/// The parts of a Crossref OpenURL XML answer the pipeline uses.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct QueryAnswer {
    pub status: Option<String>,
    pub dois: Vec<String>,
}

/// Reads the first `<query>` element's status and every `<doi>` inside it.
pub(crate) fn parse_query_answer(xml: &str) -> Result<QueryAnswer, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut answer = QueryAnswer::default();
    let mut in_query = false;
    let mut seen_query = false;
    let mut in_doi = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"query" if !seen_query => {
                    in_query = true;
                    seen_query = true;
                    answer.status = query_status(e);
                }
                b"doi" if in_query => in_doi = true,
                _ => {}
            },
            Event::Empty(ref e) => {
                if e.local_name().as_ref() == b"query" && !seen_query {
                    seen_query = true;
                    answer.status = query_status(e);
                }
            }
            Event::Text(e) if in_doi => {
                let text = e.unescape()?.trim().to_string();
                if !text.is_empty() {
                    answer.dois.push(text);
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"doi" => in_doi = false,
                b"query" => in_query = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(answer)
}

fn query_status(e: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"status")
        .map(|attr| String::from_utf8_lossy(&attr.value).trim().to_string())
}

// ==================== CrossrefClient ====================

/// Client for the Crossref OpenURL endpoint.
#[derive(Clone)]
pub struct CrossrefClient {
    client: Client,
    base_url: String,
    pid: String,
}

impl CrossrefClient {
    /// Creates a client against the public endpoint with the default `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if HTTP client construction fails.
    pub fn new() -> Result<Self, ResolveError> {
        Self::with_base_url(
            DEFAULT_CROSSREF_URL,
            DEFAULT_CROSSREF_EMAIL,
            HttpTimeouts::default(),
        )
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if `pid` contains control characters or HTTP
    /// client construction fails.
    #[tracing::instrument(skip_all, fields(pid))]
    pub fn with_base_url(
        base_url: impl Into<String>,
        pid: impl Into<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ResolveError> {
        let pid = pid.into();
        if pid.chars().any(|c| c == '\n' || c == '\r' || c == '\0') {
            return Err(ResolveError::invalid_configuration(
                "crossref",
                "pid contains invalid control characters",
            ));
        }
        Ok(Self {
            client: build_lookup_http_client("crossref", timeouts)?,
            base_url: base_url.into(),
            pid,
        })
    }

    /// Crossref query for `context`, without `multihit`; this is the link
    /// stored on records with several candidates.
    #[must_use]
    pub fn discovery_url(&self, context: &str) -> String {
        format!(
            "{}?pid={}&{context}",
            self.base_url,
            urlencoding::encode(&self.pid)
        )
    }

    /// Looks up DOIs matching an OpenURL context object.
    #[tracing::instrument(skip(self, context), fields(service = "crossref"))]
    pub async fn lookup(&self, context: &str) -> CrossrefMatch {
        let discovery_url = self.discovery_url(context);
        let url = format!("{discovery_url}&multihit=true");

        let body = match fetch_text(&self.client, "crossref", &url).await {
            Fetched::Body(body) => body,
            Fetched::Rejected | Fetched::Unavailable => return CrossrefMatch::NetworkError,
        };

        let answer = match parse_query_answer(&body) {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "Failed to parse Crossref OpenURL XML");
                return CrossrefMatch::NetworkError;
            }
        };

        let outcome = match answer.status.as_deref() {
            Some("resolved") => answer
                .dois
                .into_iter()
                .next()
                .map_or(CrossrefMatch::NetworkError, CrossrefMatch::Resolved),
            Some("unresolved") => CrossrefMatch::Unresolved,
            Some("multiresolved") => CrossrefMatch::MultiResolved {
                discovery_url,
                candidates: answer.dois,
            },
            other => {
                warn!(status = ?other, "Crossref lookup returned unknown status");
                CrossrefMatch::NetworkError
            }
        };
        debug!(?outcome, "Crossref lookup finished");
        outcome
    }
}

impl std::fmt::Debug for CrossrefClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossrefClient")
            .field("base_url", &self.base_url)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}
