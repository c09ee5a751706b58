//! Capability interface to the external PKI toolkit.
//!
//! The engine never performs cryptography itself. Every key, CSR,
//! certificate, CRL and bundle is produced by a [`PkiToolkit`]. Each call
//! either writes its declared output file or fails.

mod openssl;

pub use openssl::{render_openssl_config, OpensslToolkit};

use async_trait::async_trait;
use std::fmt;
use std::path::Path;

use crate::database::{RevokedEntry, Serial};
use crate::Result;

/// Ordered distinguished name, rendered as `/C=KR/O=../CN=..`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    attributes: Vec<(&'static str, String)>,
}

impl Subject {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.attributes.push((key, value.into()));
        self
    }

    /// Value of the first attribute named `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Parse the `/K=V/K=V` form. Unknown keys are dropped.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        const KNOWN: [&str; 6] = ["C", "O", "OU", "CN", "emailAddress", "L"];
        let attributes = raw
            .split('/')
            .filter_map(|part| part.split_once('='))
            .filter_map(|(k, v)| {
                KNOWN
                    .iter()
                    .find(|known| **known == k)
                    .map(|known| (*known, v.to_string()))
            })
            .collect();
        Self { attributes }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.attributes {
            write!(f, "/{key}={value}")?;
        }
        Ok(())
    }
}

/// Generate a private key.
#[derive(Debug)]
pub struct KeyRequest<'a> {
    pub out: &'a Path,
}

/// Build a CSR for an existing key.
#[derive(Debug)]
pub struct CsrRequest<'a> {
    pub key: &'a Path,
    pub subject: &'a Subject,
    pub config: &'a Path,
    pub out: &'a Path,
}

/// Self-sign the root certificate.
#[derive(Debug)]
pub struct RootRequest<'a> {
    pub key: &'a Path,
    pub subject: &'a Subject,
    pub config: &'a Path,
    pub days: u32,
    pub out: &'a Path,
}

/// Sign a CSR with the root key under an explicit serial.
#[derive(Debug)]
pub struct SignRequest<'a> {
    pub csr: &'a Path,
    pub ca_certificate: &'a Path,
    pub ca_key: &'a Path,
    pub config: &'a Path,
    /// Extension section in the config (`usr_cert` / `srv_cert`).
    pub extension: &'a str,
    pub serial: &'a Serial,
    pub days: u32,
    pub out: &'a Path,
}

/// Produce a CRL listing `revoked`.
#[derive(Debug)]
pub struct CrlRequest<'a> {
    pub ca_certificate: &'a Path,
    pub ca_key: &'a Path,
    pub config: &'a Path,
    pub crl_number: u64,
    pub revoked: &'a [RevokedEntry],
    pub out: &'a Path,
}

/// Fold a chain and key into a password-protected bundle.
pub struct BundleRequest<'a> {
    pub chain: &'a Path,
    pub key: &'a Path,
    pub password: &'a str,
    pub out: &'a Path,
}

impl fmt::Debug for BundleRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleRequest")
            .field("chain", &self.chain)
            .field("key", &self.key)
            .field("password", &"<redacted>")
            .field("out", &self.out)
            .finish()
    }
}

/// External PKI toolkit.
#[async_trait]
pub trait PkiToolkit: Send + Sync {
    async fn generate_key(&self, request: &KeyRequest<'_>) -> Result<()>;

    async fn generate_csr(&self, request: &CsrRequest<'_>) -> Result<()>;

    async fn self_sign_root(&self, request: &RootRequest<'_>) -> Result<()>;

    async fn sign_certificate(&self, request: &SignRequest<'_>) -> Result<()>;

    async fn generate_crl(&self, request: &CrlRequest<'_>) -> Result<()>;

    async fn export_bundle(&self, request: &BundleRequest<'_>) -> Result<()>;

    /// Succeeds only if `bundle` opens with `password`.
    async fn verify_bundle(&self, bundle: &Path, password: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_round_trip() {
        let subject = Subject::new()
            .with("C", "KR")
            .with("O", "SPARCS")
            .with("CN", "alice")
            .with("emailAddress", "alice@sparcs.org");
        let rendered = subject.to_string();
        assert_eq!(rendered, "/C=KR/O=SPARCS/CN=alice/emailAddress=alice@sparcs.org");
        assert_eq!(Subject::parse(&rendered), subject);
        assert_eq!(subject.get("CN"), Some("alice"));
    }

    #[test]
    fn test_bundle_request_debug_hides_password() {
        let request = BundleRequest {
            chain: Path::new("a.fullchain"),
            key: Path::new("a.key"),
            password: "hunter2",
            out: Path::new("a.p12"),
        };
        assert!(!format!("{request:?}").contains("hunter2"));
    }
}
