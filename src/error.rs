//! Error types for Autoclerk
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Autoclerk operations
///
/// The authorization variants form the taxonomy callers are expected to
/// branch on. Everything is returned through [`Result`], so callers classify
/// a failure with `err.downcast_ref::<AutoclerkError>()`.
#[derive(Error, Debug)]
pub enum AutoclerkError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The `state` echoed by the redirect callback did not match the value
    /// generated for this flow. Never retried automatically.
    #[error("CSRF state mismatch in authorization callback; restart the authorization flow")]
    CsrfMismatch,

    /// The client secret descriptor is missing, malformed, or was rejected
    /// by the provider.
    #[error("Invalid client secret: {0}")]
    InvalidClientSecret(String),

    /// The provider refused the request because the API is not enabled for
    /// the project that owns the client.
    #[error("API not enabled: {0}")]
    ApiNotEnabled(String),

    /// Transient transport failure talking to the provider
    #[error("Network error: {0}")]
    Network(String),

    /// No redirect callback arrived before the configured deadline
    #[error("Authorization timed out after {seconds}s waiting for the browser callback")]
    AuthorizationTimeout {
        /// The configured callback timeout
        seconds: u64,
    },

    /// Another authorization or refresh is already running
    #[error("An authorization flow is already in progress")]
    AuthorizationInProgress,

    /// The user denied consent or the provider returned `error=` on the
    /// redirect
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// The token endpoint rejected a grant (e.g. `invalid_grant`)
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// Token storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl AutoclerkError {
    /// Returns `true` for failures a caller may retry by re-running the
    /// whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AutoclerkError::Network(_))
    }
}

/// Result type alias for Autoclerk operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
