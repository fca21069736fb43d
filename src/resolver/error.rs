//! Error types for lookup client construction.
//!
//! Lookups themselves never fail with an error: every transport or protocol
//! problem becomes a [`super::Resolution`]. What can fail is building a
//! client, following the What/Why/Fix pattern used across the project.

use thiserror::Error;

/// Errors that can occur while setting up a lookup client.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The HTTP client for a service could not be constructed
    #[error("failed to build HTTP client for {service}: {reason}\n  Suggestion: {suggestion}")]
    ClientBuild {
        /// Which lookup service the client was for
        service: String,
        /// Why construction failed
        reason: String,
        /// How to fix the issue
        suggestion: String,
    },

    /// A client setting is unusable
    #[error("invalid {service} configuration: {reason}\n  Suggestion: {suggestion}")]
    InvalidConfiguration {
        /// Which lookup service the setting belongs to
        service: String,
        /// What is wrong with the setting
        reason: String,
        /// How to fix the issue
        suggestion: String,
    },
}

impl ResolveError {
    /// Creates a `ClientBuild` error.
    #[must_use]
    pub fn client_build(service: &str, reason: &str) -> Self {
        Self::ClientBuild {
            service: service.to_string(),
            reason: reason.to_string(),
            suggestion: "Check proxy environment variables and TLS setup".to_string(),
        }
    }

    /// Creates an `InvalidConfiguration` error.
    #[must_use]
    pub fn invalid_configuration(service: &str, reason: &str) -> Self {
        Self::InvalidConfiguration {
            service: service.to_string(),
            reason: reason.to_string(),
            suggestion: "Fix the [services] section of the config file".to_string(),
        }
    }
}
