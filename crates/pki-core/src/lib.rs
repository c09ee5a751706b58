//! # pki-core
//!
//! Certificate lifecycle engine for a small private certificate authority.
//!
//! ## Architecture
//!
//! ```text
//! Authority ─┬─ StorageLayout   fixed paths under one storage root
//!            ├─ GlobalLock      one exclusive file lock for every mutation
//!            ├─ CaDatabase      serial / index.txt / crlnumber
//!            └─ PkiToolkit      external key, CSR, signing, CRL and bundle ops
//! ```
//!
//! Every mutating operation (`init`, `clean`, `issue`, `revoke`, `discard`,
//! `generate_crl`) acquires the global lock, re-reads the on-disk state,
//! mutates it and releases. Nothing is cached in memory between calls, so
//! the CLI and any number of portal workers can share one storage root.
//!
//! `status` and the bundle-download path read without the lock.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pki_core::{Authority, CertificateType, PkiConfig};
//!
//! let authority = Authority::with_openssl(PkiConfig::load("pki.toml".as_ref())?);
//! authority.init().await?;
//! let issued = authority.issue("alice", CertificateType::User, Some("s3cret")).await?;
//! println!("bundle at {}", issued.bundle.display());
//! ```

mod authority;
mod config;
mod crl;
mod database;
mod error;
mod layout;
mod lifecycle;
mod lock;
mod session;
mod status;
pub mod toolkit;

pub use authority::Authority;
pub use config::{PkiConfig, SubjectConfig};
pub use database::{EntryStatus, IndexEntry, RevokedEntry, Serial, INITIAL_COUNTER};
pub use error::{ErrorKind, PkiError, Result};
pub use layout::{CommonName, LeafPaths, StorageLayout, ROOT_SUBDIRS};
pub use lifecycle::IssuedCertificate;
pub use lock::{GlobalLock, LockGuard};
pub use session::{Session, SessionAuthenticator};
pub use status::{
    classify, parse_certificate, parse_crl, CertState, CertificateFacts, CertificateStatus,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of leaf certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateType {
    /// A person; subject carries an email address
    User,
    /// A machine or service; name-only subject
    Service,
}

impl CertificateType {
    /// Validity in days, including a 10-day grace period.
    #[must_use]
    pub const fn validity_days(self) -> u32 {
        match self {
            Self::User => 365 + 10,
            Self::Service => 730 + 10,
        }
    }

    /// Extension section in the toolkit configuration.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::User => "usr_cert",
            Self::Service => "srv_cert",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateType {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "service" => Ok(Self::Service),
            other => Err(PkiError::Config(format!("unknown certificate type: {other}"))),
        }
    }
}
