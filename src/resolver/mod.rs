//! Lookup clients for the three DOI services and the canonical
//! [`Resolution`] they produce.
//!
//! # Architecture
//!
//! - [`DoiLookup`] - async trait the batch coordinator depends on
//! - [`ResolverClient`] - network implementation over the three services
//! - [`ShortDoiClient`] - long DOI to `10/<suffix>` alias
//! - [`HandleClient`] - handle records for lengthening and verification
//! - [`CrossrefClient`] - OpenURL search for records without a DOI
//! - [`context_object`] - OpenURL KEV builder for record metadata
//!
//! Lookups never return `Err`. Every transport or protocol failure becomes
//! [`Resolution::NetworkError`] so the batch can move on.

mod crossref;
mod error;
mod handle;
mod http_client;
mod openurl;
mod shortdoi;

pub use crossref::{CrossrefClient, CrossrefMatch};
pub use error::ResolveError;
pub use handle::HandleClient;
pub use http_client::{HttpTimeouts, build_lookup_http_client};
pub use openurl::{CREATORS_FIELD, context_object};
pub use shortdoi::ShortDoiClient;

use async_trait::async_trait;

use crate::config::ServiceSettings;
use crate::identifier::is_short_form;

/// Outcome of one lookup, ready for the mutation applier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The service returned a (possibly new) identifier.
    Resolved(String),
    /// Check operation: the stored identifier is already canonical.
    Verified,
    /// Crossref found no DOI for the metadata.
    Unresolved,
    /// Crossref found several candidate DOIs.
    MultiResolved {
        discovery_url: String,
        candidates: Vec<String>,
    },
    /// The identifier is unknown or malformed.
    Invalid,
    /// Transport failure; the record is skipped.
    NetworkError,
}

/// The lookup seam the batch coordinator depends on.
///
/// # Object Safety
///
/// Uses `async_trait` so the coordinator can hold an `Arc<dyn DoiLookup>`.
#[async_trait]
pub trait DoiLookup: Send + Sync {
    /// Short operation on a cleaned identifier.
    async fn resolve_short(&self, doi: &str) -> Resolution;

    /// Long operation; `was_short` selects the alias-target path.
    async fn resolve_long(&self, doi: &str, was_short: bool) -> Resolution;

    /// Check operation against the stored raw value.
    async fn resolve_check(&self, doi: &str, stored: &str) -> Resolution;

    /// Crossref search for a record without an identifier.
    async fn crossref_lookup(&self, context: &str) -> CrossrefMatch;
}

/// Network-backed [`DoiLookup`].
#[derive(Debug, Clone)]
pub struct ResolverClient {
    shortdoi: ShortDoiClient,
    handles: HandleClient,
    crossref: CrossrefClient,
}

impl ResolverClient {
    /// Builds clients for the configured services.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if any HTTP client cannot be built or the
    /// Crossref contact address is unusable.
    #[tracing::instrument(skip_all)]
    pub fn new(settings: &ServiceSettings) -> Result<Self, ResolveError> {
        let timeouts = HttpTimeouts::from(settings);
        Ok(Self {
            shortdoi: ShortDoiClient::with_base_url(&settings.shortdoi_url, timeouts)?,
            handles: HandleClient::with_base_url(&settings.handle_url, timeouts)?,
            crossref: CrossrefClient::with_base_url(
                &settings.crossref_url,
                &settings.crossref_email,
                timeouts,
            )?,
        })
    }
}

#[async_trait]
impl DoiLookup for ResolverClient {
    async fn resolve_short(&self, doi: &str) -> Resolution {
        if is_short_form(doi) {
            self.handles.short_alias(doi).await
        } else {
            self.shortdoi.shorten(doi).await
        }
    }

    async fn resolve_long(&self, doi: &str, was_short: bool) -> Resolution {
        self.handles.lengthen(doi, was_short).await
    }

    async fn resolve_check(&self, doi: &str, stored: &str) -> Resolution {
        self.handles.verify(doi, stored).await
    }

    async fn crossref_lookup(&self, context: &str) -> CrossrefMatch {
        self.crossref.lookup(context).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    #[test]
    fn test_resolver_client_rejects_bad_pid() {
        let mut settings = ServiceSettings::default();
        settings.crossref_email = "x\r\ny".to_string();
        assert!(ResolverClient::new(&settings).is_err());
    }

    #[tokio::test]
    async fn test_resolve_short_routes_short_form_to_handles() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/handles/10%2Fabc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"responseCode": 1, "handle": "10/ABC"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&mock_server)
            .await;

        let settings = ServiceSettings {
            shortdoi_url: format!("{}/short", mock_server.uri()),
            handle_url: format!("{}/handles", mock_server.uri()),
            crossref_url: format!("{}/openurl", mock_server.uri()),
            ..ServiceSettings::default()
        };
        let client = ResolverClient::new(&settings).unwrap();
        assert_eq!(
            client.resolve_short("10/abc").await,
            Resolution::Resolved("10/abc".to_string())
        );
    }
}
