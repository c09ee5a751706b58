//! Certificate status evaluation.
//!
//! Reads leaf artifacts and the CRL without taking the global lock. A
//! concurrent revoke may remove files between reads; a file that vanishes
//! is reported as absent, never as an error.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

use crate::database::Serial;
use crate::{PkiError, Result};

/// Lifecycle state of the certificate for one common name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertState {
    /// No signed certificate on disk
    None,
    /// Valid and not close to expiry
    Ok,
    /// Valid but inside the renewal window
    Warn,
    /// Past its notAfter
    Expired,
    /// Listed in the current CRL
    Revoked,
}

impl CertState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for CertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields of a certificate the evaluator needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFacts {
    pub serial: Serial,
    pub not_after: DateTime<Utc>,
}

/// Evaluated state plus the expiry it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateStatus {
    pub state: CertState,
    /// Expiry of the current certificate. `None` for `NONE` and `REVOKED`.
    pub expires: Option<DateTime<Utc>>,
}

/// Classify a certificate.
///
/// Order matters: revocation wins over expiry, expiry over the warning
/// window. `WARN` covers `[not_after - warn_window, not_after)`.
#[must_use]
pub fn classify(
    certificate: Option<&CertificateFacts>,
    revoked: &BTreeSet<Serial>,
    now: DateTime<Utc>,
    warn_window: Duration,
) -> CertificateStatus {
    let Some(cert) = certificate else {
        return CertificateStatus {
            state: CertState::None,
            expires: None,
        };
    };

    let state = if revoked.contains(&cert.serial) {
        CertState::Revoked
    } else if now >= cert.not_after {
        CertState::Expired
    } else if now >= cert.not_after - warn_window {
        CertState::Warn
    } else {
        CertState::Ok
    };

    CertificateStatus {
        state,
        expires: (state != CertState::Revoked).then_some(cert.not_after),
    }
}

/// Decode PEM if present, otherwise treat the bytes as DER.
fn der_contents(bytes: &[u8], tag: &str, path: &Path) -> Result<Vec<u8>> {
    if bytes.starts_with(b"-----BEGIN") {
        let pems = pem::parse_many(bytes).map_err(|e| PkiError::CertParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        pems.into_iter()
            .find(|p| p.tag() == tag)
            .map(|p| p.contents().to_vec())
            .ok_or_else(|| PkiError::CertParse {
                path: path.display().to_string(),
                reason: format!("no {tag} block"),
            })
    } else {
        Ok(bytes.to_vec())
    }
}

/// Read `None` for a missing file instead of failing.
async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PkiError::io(path, e)),
    }
}

/// Parse serial and expiry of the first certificate in `bytes`.
pub fn parse_certificate(bytes: &[u8], path: &Path) -> Result<CertificateFacts> {
    let der = der_contents(bytes, "CERTIFICATE", path)?;
    let (_, cert) =
        x509_parser::parse_x509_certificate(&der).map_err(|e| PkiError::CertParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let timestamp = cert.validity().not_after.timestamp();
    let not_after = Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| PkiError::CertParse {
            path: path.display().to_string(),
            reason: format!("notAfter out of range: {timestamp}"),
        })?;

    Ok(CertificateFacts {
        serial: Serial::from_be_bytes(cert.raw_serial()),
        not_after,
    })
}

/// Parse the revoked-serial set of a CRL.
pub fn parse_crl(bytes: &[u8], path: &Path) -> Result<BTreeSet<Serial>> {
    let der = der_contents(bytes, "X509 CRL", path)?;
    let (_, crl) = x509_parser::parse_x509_crl(&der).map_err(|e| PkiError::CertParse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    Ok(crl
        .iter_revoked_certificates()
        .map(|revoked| Serial::from_be_bytes(revoked.raw_serial()))
        .collect())
}

/// Facts of the certificate at `path`, or `None` if it does not exist.
pub async fn read_certificate(path: &Path) -> Result<Option<CertificateFacts>> {
    read_optional(path)
        .await?
        .map(|bytes| parse_certificate(&bytes, path))
        .transpose()
}

/// Revoked serials from the CRL at `path`. A missing CRL revokes nothing.
pub async fn read_revoked_serials(path: &Path) -> Result<BTreeSet<Serial>> {
    Ok(read_optional(path)
        .await?
        .map(|bytes| parse_crl(&bytes, path))
        .transpose()?
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(days: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap() + Duration::days(days)
    }

    fn facts(serial: u64, not_after: DateTime<Utc>) -> CertificateFacts {
        CertificateFacts {
            serial: Serial::from_u64(serial),
            not_after,
        }
    }

    fn state(cert: Option<&CertificateFacts>, revoked: &[u64], now: DateTime<Utc>) -> CertState {
        let revoked = revoked.iter().copied().map(Serial::from_u64).collect();
        classify(cert, &revoked, now, Duration::days(10)).state
    }

    #[test]
    fn test_missing_certificate_is_none() {
        assert_eq!(state(None, &[0x1000], at(0)), CertState::None);
    }

    #[test]
    fn test_fresh_certificate_is_ok() {
        let cert = facts(0x1000, at(375));
        let status = classify(Some(&cert), &BTreeSet::new(), at(0), Duration::days(10));
        assert_eq!(status.state, CertState::Ok);
        assert_eq!(status.expires, Some(at(375)));
    }

    #[test]
    fn test_warn_window_precedes_expiry() {
        let cert = facts(0x1000, at(30));
        assert_eq!(state(Some(&cert), &[], at(19)), CertState::Ok);
        assert_eq!(state(Some(&cert), &[], at(20)), CertState::Warn);
        assert_eq!(state(Some(&cert), &[], at(29)), CertState::Warn);
        assert_eq!(state(Some(&cert), &[], at(30)), CertState::Expired);
    }

    #[test]
    fn test_revocation_short_circuits_expiry() {
        let cert = facts(0x1000, at(-5));
        assert_eq!(state(Some(&cert), &[0x1000], at(0)), CertState::Revoked);
        assert_eq!(state(Some(&cert), &[0x1001], at(0)), CertState::Expired);

        let revoked = BTreeSet::from([Serial::from_u64(0x1000)]);
        let status = classify(Some(&cert), &revoked, at(0), Duration::days(10));
        assert_eq!(status.expires, None);
    }

    #[test]
    fn test_garbage_certificate_is_parse_error() {
        let err = parse_certificate(b"not a certificate", Path::new("x.crt")).unwrap_err();
        assert!(matches!(err, PkiError::CertParse { .. }));
    }

    #[tokio::test]
    async fn test_missing_files_are_absent_not_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(read_certificate(&dir.path().join("gone.crt"))
            .await
            .unwrap()
            .is_none());
        assert!(read_revoked_serials(&dir.path().join("gone.crl"))
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&CertState::Warn).unwrap(), "\"warn\"");
        assert_eq!(CertState::Revoked.to_string(), "revoked");
    }
}
