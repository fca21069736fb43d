//! Shared HTTP policy for the lookup clients.
//!
//! Centralizes timeouts, User-Agent, compression and proxy fallback, and the
//! mapping from HTTP outcomes to a [`Fetched`] value that every client
//! interprets the same way.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ServiceSettings;
use crate::user_agent;

use super::ResolveError;

/// Connect and read timeouts for lookup requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self::from(&ServiceSettings::default())
    }
}

impl From<&ServiceSettings> for HttpTimeouts {
    fn from(settings: &ServiceSettings) -> Self {
        Self {
            connect_timeout_secs: settings.connect_timeout_secs,
            read_timeout_secs: settings.read_timeout_secs,
        }
    }
}

/// Builds a lookup HTTP client using the shared project policy.
///
/// `service` is used only for error messages and logging.
///
/// # Errors
///
/// Returns [`ResolveError::ClientBuild`] when client construction fails.
pub fn build_lookup_http_client(
    service: &str,
    timeouts: HttpTimeouts,
) -> Result<Client, ResolveError> {
    let user_agent = user_agent::default_lookup_user_agent();

    match try_build_client(&user_agent, timeouts, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed environments panic when querying system proxy
            // settings; retry with env proxies only.
            warn!(
                service,
                "Lookup client hit system proxy panic; using env-proxy fallback builder"
            );
            match try_build_client(&user_agent, timeouts, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(ResolveError::client_build(
                    service,
                    "HTTP client construction panicked while initializing networking",
                )),
                Err(BuildClientFailure::Build(error)) => Err(ResolveError::client_build(
                    service,
                    &format!("HTTP client construction failed: {error}"),
                )),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(ResolveError::client_build(
            service,
            &format!("HTTP client construction failed: {error}"),
        )),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    user_agent: &str,
    timeouts: HttpTimeouts,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let user_agent = user_agent.to_string();
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(user_agent, timeouts);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(user_agent: String, timeouts: HttpTimeouts) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(timeouts.connect_timeout_secs))
        .timeout(Duration::from_secs(timeouts.read_timeout_secs))
        .user_agent(user_agent)
        .gzip(true)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

/// Outcome of one lookup request before service-specific interpretation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Fetched<T> {
    /// HTTP 200 with a decodable body.
    Body(T),
    /// HTTP 400 or 404: the service does not know the identifier.
    Rejected,
    /// Transport failure, other status, or an undecodable body.
    Unavailable,
}

/// Maps an HTTP status to the shared rejection policy. `None` means 200.
pub(crate) fn classify_status<T>(status: StatusCode) -> Option<Fetched<T>> {
    match status.as_u16() {
        200 => None,
        400 | 404 => Some(Fetched::Rejected),
        _ => Some(Fetched::Unavailable),
    }
}

/// GETs `url` and decodes a JSON body.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    client: &Client,
    service: &str,
    url: &str,
) -> Fetched<T> {
    debug!(service, api_url = %url, "Calling lookup service");

    let response = match client.get(url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(service, error = %e, "Lookup request failed");
            return Fetched::Unavailable;
        }
    };

    let status = response.status();
    if let Some(outcome) = classify_status(status) {
        debug!(service, status = status.as_u16(), "Lookup service returned non-200");
        return outcome;
    }

    match response.json::<T>().await {
        Ok(body) => Fetched::Body(body),
        Err(e) => {
            warn!(service, error = %e, "Failed to decode lookup response JSON");
            Fetched::Unavailable
        }
    }
}

/// GETs `url` and returns the body text.
pub(crate) async fn fetch_text(client: &Client, service: &str, url: &str) -> Fetched<String> {
    debug!(service, api_url = %url, "Calling lookup service");

    let response = match client.get(url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(service, error = %e, "Lookup request failed");
            return Fetched::Unavailable;
        }
    };

    let status = response.status();
    if status != StatusCode::OK {
        debug!(service, status = status.as_u16(), "Lookup service returned non-200");
        return Fetched::Unavailable;
    }

    match response.text().await {
        Ok(body) => Fetched::Body(body),
        Err(e) => {
            warn!(service, error = %e, "Failed to read lookup response body");
            Fetched::Unavailable
        }
    }
}
