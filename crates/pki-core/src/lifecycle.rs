//! Issue, revoke and discard of leaf certificates.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::authority::{path_exists, remove_file_if_exists, Authority};
use crate::database::{write_atomic, EntryStatus, IndexEntry, Serial};
use crate::layout::{CommonName, LeafPaths};
use crate::status::{classify, parse_certificate, read_certificate, read_revoked_serials};
use crate::toolkit::{BundleRequest, CsrRequest, KeyRequest, SignRequest, Subject};
use crate::{CertificateStatus, CertificateType, PkiError, Result};

/// Result of a successful issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub common_name: CommonName,
    pub kind: CertificateType,
    pub serial: Serial,
    pub expires: DateTime<Utc>,
    /// Final location of the password-protected bundle.
    pub bundle: PathBuf,
}

impl Authority {
    pub(crate) fn leaf_subject(&self, cn: &CommonName, kind: CertificateType) -> Subject {
        let s = &self.inner.config.subject;
        let subject = Subject::new().with("C", &s.country).with("O", &s.organization);
        match kind {
            CertificateType::User => subject
                .with("OU", &s.user_unit)
                .with("CN", cn.as_str())
                .with("emailAddress", format!("{cn}@{}", s.email_domain)),
            CertificateType::Service => subject.with("OU", &s.service_unit).with("CN", cn.as_str()),
        }
    }

    /// Issue a bundle for `common_name`.
    ///
    /// An absent or empty `password` falls back to the common name itself.
    /// The bundle only appears under its final name once every step
    /// succeeded; on failure the leaf area is left without bundle, chain,
    /// certificate or key for this name.
    pub async fn issue(
        &self,
        common_name: &str,
        kind: CertificateType,
        password: Option<&str>,
    ) -> Result<IssuedCertificate> {
        let cn = CommonName::parse(common_name)?;
        let password = password.filter(|p| !p.is_empty()).unwrap_or(cn.as_str());

        let _guard = self.lock_initialized().await?;

        let paths = self.inner.layout.leaf(&cn);
        if path_exists(&paths.bundle).await? {
            return Err(PkiError::AlreadyIssued {
                common_name: cn.to_string(),
            });
        }

        match self.issue_locked(&cn, kind, password, &paths).await {
            Ok(issued) => {
                info!(
                    common_name = %cn,
                    kind = %kind,
                    serial = %issued.serial,
                    expires = %issued.expires,
                    "certificate issued"
                );
                Ok(issued)
            }
            Err(e) => {
                warn!(common_name = %cn, error = %e, "issuance failed, removing partial artifacts");
                remove_quietly(&paths.ephemeral()).await;
                remove_quietly(&[
                    paths.bundle_partial.as_path(),
                    paths.chain.as_path(),
                    paths.certificate.as_path(),
                ])
                .await;
                Err(e)
            }
        }
    }

    async fn issue_locked(
        &self,
        cn: &CommonName,
        kind: CertificateType,
        password: &str,
        paths: &LeafPaths,
    ) -> Result<IssuedCertificate> {
        let layout = &self.inner.layout;
        let db = &self.inner.db;
        let toolkit = self.toolkit();
        let config = layout.openssl_config();
        let root_certificate = layout.root_certificate();

        let next = db.next_serial().await?;
        let serial = Serial::from_u64(next);
        let subject = self.leaf_subject(cn, kind);

        toolkit.generate_key(&KeyRequest { out: &paths.key }).await?;
        toolkit
            .generate_csr(&CsrRequest {
                key: &paths.key,
                subject: &subject,
                config: &config,
                out: &paths.csr,
            })
            .await?;
        toolkit
            .sign_certificate(&SignRequest {
                csr: &paths.csr,
                ca_certificate: &root_certificate,
                ca_key: &layout.root_key(),
                config: &config,
                extension: kind.extension(),
                serial: &serial,
                days: kind.validity_days(),
                out: &paths.certificate,
            })
            .await?;

        let certificate = read_file(&paths.certificate).await?;
        let facts = parse_certificate(&certificate, &paths.certificate)?;
        db.set_next_serial(next + 1).await?;

        let mut chain = certificate.clone();
        if !chain.ends_with(b"\n") {
            chain.push(b'\n');
        }
        chain.extend_from_slice(&read_file(&root_certificate).await?);
        write_atomic(&paths.chain, &chain).await?;

        remove_file_if_exists(&paths.bundle_partial).await?;
        toolkit
            .export_bundle(&BundleRequest {
                chain: &paths.chain,
                key: &paths.key,
                password,
                out: &paths.bundle_partial,
            })
            .await?;
        remove_quietly(&paths.ephemeral()).await;

        write_atomic(&layout.issued_copy(&facts.serial), &certificate).await?;
        db.append(IndexEntry {
            status: EntryStatus::Valid,
            expires: facts.not_after,
            revoked_at: None,
            serial: facts.serial.clone(),
            subject: subject.to_string(),
        })
        .await?;

        tokio::fs::rename(&paths.bundle_partial, &paths.bundle)
            .await
            .map_err(|e| PkiError::io(&paths.bundle, e))?;

        Ok(IssuedCertificate {
            common_name: cn.clone(),
            kind,
            serial: facts.serial,
            expires: facts.not_after,
            bundle: paths.bundle.clone(),
        })
    }

    /// Revoke the current certificate for `common_name`, remove its
    /// published artifacts and regenerate the CRL before returning.
    ///
    /// The audit copy under `root/newcerts/` is kept.
    pub async fn revoke(&self, common_name: &str) -> Result<IndexEntry> {
        let cn = CommonName::parse(common_name)?;
        let (entry, cleanup) = {
            let _guard = self.lock_initialized().await?;

            let entry = self.inner.db.revoke(&cn, Utc::now()).await.inspect_err(|e| {
                warn!(common_name = %cn, error = %e, "revocation failed");
            })?;
            let cleanup = self.remove_published(&self.inner.layout.leaf(&cn)).await;
            (entry, cleanup)
        };

        info!(common_name = %cn, serial = %entry.serial, "certificate revoked");
        if let Err(e) = &cleanup {
            warn!(common_name = %cn, error = %e, "failed to remove leaf artifacts after revocation");
        }
        // The index already says revoked; the CRL must follow even if
        // cleanup failed.
        self.generate_crl().await?;
        cleanup.map(|()| entry)
    }

    /// Remove the leaf artifacts for `common_name` without touching the
    /// index. Used when the certificate is already revoked.
    pub async fn discard(&self, common_name: &str) -> Result<()> {
        let cn = CommonName::parse(common_name)?;
        let _guard = self.lock_initialized().await?;
        self.remove_published(&self.inner.layout.leaf(&cn)).await?;
        info!(common_name = %cn, "leaf artifacts discarded");
        Ok(())
    }

    async fn remove_published(&self, paths: &LeafPaths) -> Result<()> {
        for path in paths.published() {
            remove_file_if_exists(path).await?;
        }
        for path in paths.ephemeral() {
            remove_file_if_exists(path).await?;
        }
        remove_file_if_exists(&paths.bundle_partial).await
    }

    /// Path of the bundle for `common_name`, if one exists. Lock-free.
    pub async fn bundle_path(&self, common_name: &str) -> Result<Option<PathBuf>> {
        let cn = CommonName::parse(common_name)?;
        let bundle = self.inner.layout.leaf(&cn).bundle;
        Ok(path_exists(&bundle).await?.then_some(bundle))
    }

    /// Copy the bundle for `common_name` to `dest` and return the written
    /// path. A directory `dest` receives `<cn>.p12`.
    pub async fn copy_bundle(&self, common_name: &str, dest: &Path) -> Result<PathBuf> {
        let Some(bundle) = self.bundle_path(common_name).await? else {
            return Err(PkiError::NotFound {
                common_name: common_name.to_string(),
            });
        };

        let target = if tokio::fs::metadata(dest).await.is_ok_and(|m| m.is_dir()) {
            dest.join(format!("{common_name}.p12"))
        } else {
            dest.to_path_buf()
        };
        tokio::fs::copy(&bundle, &target)
            .await
            .map_err(|e| PkiError::io(&target, e))?;
        info!(common_name, dest = %target.display(), "bundle copied");
        Ok(target)
    }

    /// Check that the bundle for `common_name` opens with `password`.
    pub async fn verify_bundle(&self, common_name: &str, password: &str) -> Result<()> {
        let Some(bundle) = self.bundle_path(common_name).await? else {
            return Err(PkiError::NotFound {
                common_name: common_name.to_string(),
            });
        };
        self.toolkit().verify_bundle(&bundle, password).await
    }

    /// Evaluate the certificate state for `common_name` at `now`. Lock-free.
    pub async fn status(&self, common_name: &str, now: DateTime<Utc>) -> Result<CertificateStatus> {
        let cn = CommonName::parse(common_name)?;
        let certificate = read_certificate(&self.inner.layout.leaf(&cn).certificate).await?;
        let revoked = match &certificate {
            Some(_) => read_revoked_serials(&self.inner.layout.crl()).await?,
            None => Default::default(),
        };
        Ok(classify(
            certificate.as_ref(),
            &revoked,
            now,
            self.inner.config.warn_window(),
        ))
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| PkiError::io(path, e))
}

/// Best-effort removal; failures are logged.
async fn remove_quietly(paths: &[&Path]) {
    for path in paths {
        if let Err(e) = remove_file_if_exists(path).await {
            warn!(path = %path.display(), error = %e, "failed to remove file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PkiConfig;

    fn authority() -> (tempfile::TempDir, Authority) {
        let dir = tempfile::TempDir::new().unwrap();
        let config = PkiConfig {
            storage_path: dir.path().to_path_buf(),
            ..PkiConfig::default()
        };
        (dir, Authority::with_openssl(config))
    }

    #[test]
    fn test_user_subject_carries_email() {
        let (_dir, authority) = authority();
        let cn = CommonName::parse("alice").unwrap();
        assert_eq!(
            authority.leaf_subject(&cn, CertificateType::User).to_string(),
            "/C=KR/O=SPARCS/OU=SPARCS Users/CN=alice/emailAddress=alice@sparcs.org"
        );
    }

    #[test]
    fn test_service_subject_is_name_only() {
        let (_dir, authority) = authority();
        let cn = CommonName::parse("git.sparcs.org").unwrap();
        assert_eq!(
            authority.leaf_subject(&cn, CertificateType::Service).to_string(),
            "/C=KR/O=SPARCS/OU=SPARCS Services/CN=git.sparcs.org"
        );
    }

    #[tokio::test]
    async fn test_status_without_certificate_is_none() {
        let (_dir, authority) = authority();
        let status = authority.status("alice", Utc::now()).await.unwrap();
        assert_eq!(status.state, crate::CertState::None);
    }

    #[tokio::test]
    async fn test_traversal_names_are_rejected_before_io() {
        let (_dir, authority) = authority();
        for name in ["../root/private/root", "a/b", "", ".hidden"] {
            let err = authority.bundle_path(name).await.unwrap_err();
            assert!(matches!(err, PkiError::InvalidCommonName(_)), "{name:?}");
        }
    }
}
