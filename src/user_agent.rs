//! Shared User-Agent string for lookup service traffic.

/// Identifies the tool to the lookup services.
#[must_use]
pub(crate) fn default_lookup_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("doi-manager/{version} (reference-library-tool)")
}
