//! On-disk layout of the CA storage root.
//!
//! ```text
//! <storage>/
//! ├── .lock
//! ├── config/openssl.cnf
//! ├── root/
//! │   ├── certs/root.crt
//! │   ├── crl/root.crl
//! │   ├── csr/
//! │   ├── newcerts/<SERIAL>.pem
//! │   ├── private/root.key
//! │   ├── index.txt
//! │   ├── serial
//! │   └── crlnumber
//! └── leaf/<cn>.{key,csr,crt,fullchain,p12}
//! ```
//!
//! Every path an operation touches comes from here. Leaf paths are only
//! reachable through a validated [`CommonName`].

use std::fmt;
use std::path::{Path, PathBuf};

use crate::database::Serial;
use crate::{PkiError, Result};

/// Subdirectories created under `root/` by `init`.
pub const ROOT_SUBDIRS: [&str; 5] = ["certs", "crl", "csr", "newcerts", "private"];

const MAX_COMMON_NAME_LEN: usize = 64;

/// A common name that is safe to embed in a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommonName(String);

impl CommonName {
    /// Validate a common name.
    ///
    /// Accepts 1..=64 ASCII alphanumerics, `.`, `-` and `_`, starting with an
    /// alphanumeric and never containing `..`.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_COMMON_NAME_LEN
            && raw.as_bytes()[0].is_ascii_alphanumeric()
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
            && !raw.contains("..");

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(PkiError::InvalidCommonName(raw.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-common-name artifact paths in the leaf area.
#[derive(Debug, Clone)]
pub struct LeafPaths {
    pub key: PathBuf,
    pub csr: PathBuf,
    pub certificate: PathBuf,
    pub chain: PathBuf,
    pub bundle: PathBuf,
    /// Staging name the bundle is written to before the final rename.
    pub bundle_partial: PathBuf,
}

impl LeafPaths {
    /// Files that only exist while an issuance is in flight.
    pub fn ephemeral(&self) -> [&Path; 2] {
        [&self.key, &self.csr]
    }

    /// Files removed when a certificate is revoked or discarded.
    pub fn published(&self) -> [&Path; 3] {
        [&self.bundle, &self.chain, &self.certificate]
    }
}

/// Fixed set of paths derived from one storage root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    storage: PathBuf,
}

impl StorageLayout {
    pub fn new(storage: impl Into<PathBuf>) -> Self {
        Self {
            storage: storage.into(),
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Path {
        &self.storage
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.storage.join(".lock")
    }

    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.storage.join("config")
    }

    #[must_use]
    pub fn openssl_config(&self) -> PathBuf {
        self.config_dir().join("openssl.cnf")
    }

    #[must_use]
    pub fn root_dir(&self) -> PathBuf {
        self.storage.join("root")
    }

    #[must_use]
    pub fn leaf_dir(&self) -> PathBuf {
        self.storage.join("leaf")
    }

    #[must_use]
    pub fn root_certificate(&self) -> PathBuf {
        self.root_dir().join("certs").join("root.crt")
    }

    #[must_use]
    pub fn root_key(&self) -> PathBuf {
        self.root_dir().join("private").join("root.key")
    }

    #[must_use]
    pub fn crl(&self) -> PathBuf {
        self.root_dir().join("crl").join("root.crl")
    }

    #[must_use]
    pub fn crl_partial(&self) -> PathBuf {
        self.root_dir().join("crl").join("root.crl.partial")
    }

    #[must_use]
    pub fn index(&self) -> PathBuf {
        self.root_dir().join("index.txt")
    }

    #[must_use]
    pub fn serial(&self) -> PathBuf {
        self.root_dir().join("serial")
    }

    #[must_use]
    pub fn crl_number(&self) -> PathBuf {
        self.root_dir().join("crlnumber")
    }

    /// Audit copy of an issued certificate.
    #[must_use]
    pub fn issued_copy(&self, serial: &Serial) -> PathBuf {
        self.root_dir().join("newcerts").join(format!("{serial}.pem"))
    }

    #[must_use]
    pub fn leaf(&self, cn: &CommonName) -> LeafPaths {
        let dir = self.leaf_dir();
        let file = |ext: &str| dir.join(format!("{cn}.{ext}"));
        LeafPaths {
            key: file("key"),
            csr: file("csr"),
            certificate: file("crt"),
            chain: file("fullchain"),
            bundle: file("p12"),
            bundle_partial: file("p12.partial"),
        }
    }

    /// True once `init` has created the root area.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.root_certificate().is_file()
    }
}
