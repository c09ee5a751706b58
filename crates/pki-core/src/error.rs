//! Error types for the certificate lifecycle engine.

use std::path::Path;
use thiserror::Error;

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, PkiError>;

/// Errors that can occur while operating the certificate authority.
#[derive(Error, Debug)]
pub enum PkiError {
    /// `init` was called on a storage root whose root area already exists.
    #[error("the PKI system is already initialized")]
    AlreadyInitialized,

    /// A lifecycle operation ran before `init`.
    #[error("the PKI system is not initialized")]
    NotInitialized,

    /// A bundle already exists for this common name.
    #[error("a certificate is already issued for CN={common_name}")]
    AlreadyIssued {
        /// Common name the bundle belongs to
        common_name: String,
    },

    /// No certificate or bundle to act on.
    #[error("no certificate found for CN={common_name}")]
    NotFound {
        /// Common name that was looked up
        common_name: String,
    },

    /// The external PKI toolkit failed.
    #[error("toolkit failed during {operation}: {reason}")]
    Toolkit {
        /// Toolkit operation (e.g. `sign_certificate`)
        operation: &'static str,
        /// Short failure description
        reason: String,
    },

    /// The external PKI toolkit did not finish in time.
    #[error("toolkit timed out during {operation} after {seconds} seconds")]
    ToolkitTimeout {
        /// Toolkit operation
        operation: &'static str,
        /// Configured timeout
        seconds: u64,
    },

    /// The global lock could not be acquired within the configured wait.
    #[error("timed out after {0} seconds waiting for the global lock")]
    LockTimeout(u64),

    /// Session token failed verification.
    #[error("invalid session token")]
    InvalidToken,

    /// Common name is unsafe or malformed.
    #[error("invalid common name: {0:?}")]
    InvalidCommonName(String),

    /// The CA index file is malformed.
    #[error("index error: {0}")]
    Index(String),

    /// A certificate or CRL could not be parsed.
    #[error("failed to parse {path}: {reason}")]
    CertParse {
        /// File that failed to parse
        path: String,
        /// Parser message
        reason: String,
    },

    /// Configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Filesystem access failed.
    #[error("io error on {path}: {source}")]
    Io {
        /// File or directory involved
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Fieldless classification of [`PkiError`] for callers that branch on outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AlreadyInitialized,
    NotInitialized,
    AlreadyIssued,
    NotFound,
    ToolkitFailure,
    LockTimeout,
    InvalidToken,
    InvalidCommonName,
    Storage,
    Config,
}

impl PkiError {
    /// Build an [`PkiError::Io`] tagged with the path involved.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Build a [`PkiError::Toolkit`] from any displayable reason.
    pub fn toolkit(operation: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Toolkit {
            operation,
            reason: reason.to_string(),
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::AlreadyIssued { .. } => ErrorKind::AlreadyIssued,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Toolkit { .. } | Self::ToolkitTimeout { .. } => ErrorKind::ToolkitFailure,
            Self::LockTimeout(_) => ErrorKind::LockTimeout,
            Self::InvalidToken => ErrorKind::InvalidToken,
            Self::InvalidCommonName(_) => ErrorKind::InvalidCommonName,
            Self::Index(_) | Self::CertParse { .. } | Self::Io { .. } => ErrorKind::Storage,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns true if the error came from the external toolkit.
    #[must_use]
    pub const fn is_toolkit_failure(&self) -> bool {
        matches!(self.kind(), ErrorKind::ToolkitFailure)
    }
}
