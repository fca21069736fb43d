//! shortDOI service client: maps a long DOI to its `10/<suffix>` alias.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::DEFAULT_SHORTDOI_URL;

use super::http_client::{Fetched, HttpTimeouts, build_lookup_http_client, fetch_json};
use super::{ResolveError, Resolution};

/// Body returned by `GET /{doi}?format=json`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ShortDoiResponse {
    #[serde(rename = "ShortDOI")]
    pub short_doi: Option<String>,
    /// Present when the service echoes a handle record instead.
    pub handle: Option<String>,
}

impl ShortDoiResponse {
    /// First non-empty of `ShortDOI` and `handle`, lower-cased.
    pub(crate) fn short_form(&self) -> Option<String> {
        [self.short_doi.as_deref(), self.handle.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_lowercase)
    }
}

/// Turns a fetched shortDOI body into a resolution.
pub(crate) fn interpret_short(fetched: Fetched<ShortDoiResponse>) -> Resolution {
    match fetched {
        Fetched::Body(body) => body
            .short_form()
            .map_or(Resolution::Invalid, Resolution::Resolved),
        Fetched::Rejected => Resolution::Invalid,
        Fetched::Unavailable => Resolution::NetworkError,
    }
}

/// Client for the shortDOI service.
#[derive(Debug, Clone)]
pub struct ShortDoiClient {
    client: Client,
    base_url: String,
}

impl ShortDoiClient {
    /// Creates a client against the public service.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if HTTP client construction fails.
    pub fn new() -> Result<Self, ResolveError> {
        Self::with_base_url(DEFAULT_SHORTDOI_URL, HttpTimeouts::default())
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
            client: build_lookup_http_client("shortdoi", timeouts)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Looks up the short alias for a long-form DOI.
    #[tracing::instrument(skip(self), fields(service = "shortdoi"))]
    pub async fn shorten(&self, doi: &str) -> Resolution {
        let url = format!("{}/{}?format=json", self.base_url, urlencoding::encode(doi));
        let resolution = interpret_short(fetch_json(&self.client, "shortdoi", &url).await);
        debug!(?resolution, "shortDOI lookup finished");
        resolution
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn client_for(uri: &str) -> ShortDoiClient {
        ShortDoiClient::with_base_url(uri, HttpTimeouts::default()).unwrap()
    }

    // ==================== Response Interpretation ====================

    #[test]
    fn test_short_form_prefers_short_doi_field() {
        let body: ShortDoiResponse = serde_json::from_value(serde_json::json!({
            "DOI": "10.1000/ABC",
            "ShortDOI": "10/BXYZ",
            "IsNew": false
        }))
        .unwrap();
        assert_eq!(body.short_form().as_deref(), Some("10/bxyz"));
    }

    #[test]
    fn test_short_form_falls_back_to_handle() {
        let body: ShortDoiResponse =
            serde_json::from_value(serde_json::json!({"ShortDOI": "", "handle": "10/Q1"})).unwrap();
        assert_eq!(body.short_form().as_deref(), Some("10/q1"));
    }

    #[test]
    fn test_interpret_empty_body_is_invalid() {
        assert_eq!(
            interpret_short(Fetched::Body(ShortDoiResponse::default())),
            Resolution::Invalid
        );
        assert_eq!(interpret_short(Fetched::Rejected), Resolution::Invalid);
        assert_eq!(interpret_short(Fetched::Unavailable), Resolution::NetworkError);
    }

    // ==================== HTTP ====================

    #[tokio::test]
    async fn test_shorten_success() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/10.1000%2Fabc"))
            .and(query_param("format", "json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"DOI": "10.1000/abc", "ShortDOI": "10/XYZ"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server.uri());
        assert_eq!(
            client.shorten("10.1000/abc").await,
            Resolution::Resolved("10/xyz".to_string())
        );
    }

    #[tokio::test]
    async fn test_shorten_404_is_invalid() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server.uri());
        assert_eq!(client.shorten("10.1000/missing").await, Resolution::Invalid);
    }

    #[tokio::test]
    async fn test_shorten_500_is_network_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server.uri());
        assert_eq!(client.shorten("10.1000/abc").await, Resolution::NetworkError);
    }

    #[tokio::test]
    async fn test_shorten_garbage_body_is_network_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server.uri());
        assert_eq!(client.shorten("10.1000/abc").await, Resolution::NetworkError);
    }
}
