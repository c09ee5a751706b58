//! Error types for the portal.

use pki_core::PkiError;
use thiserror::Error;

/// Result type alias for portal operations.
pub type Result<T> = std::result::Result<T, WebError>;

/// Errors raised outside the lifecycle engine.
#[derive(Error, Debug)]
pub enum WebError {
    /// The SSO provider rejected a request or answered with garbage.
    #[error("SSO error: {0}")]
    Sso(String),

    /// Transport failure talking to the SSO provider.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Portal configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Lifecycle engine failure.
    #[error(transparent)]
    Core(#[from] PkiError),

    /// Socket or filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
