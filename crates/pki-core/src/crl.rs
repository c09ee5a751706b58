//! CRL regeneration.

use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::authority::{remove_file_if_exists, Authority};
use crate::database::Serial;
use crate::status::read_revoked_serials;
use crate::toolkit::CrlRequest;
use crate::{PkiError, Result};

impl Authority {
    /// Regenerate the CRL from the index and advance the CRL number.
    pub async fn generate_crl(&self) -> Result<()> {
        let _guard = self.lock_initialized().await?;
        self.write_crl_locked().await
    }

    /// Caller must hold the global lock.
    pub(crate) async fn write_crl_locked(&self) -> Result<()> {
        let layout = &self.inner.layout;
        let db = &self.inner.db;

        let revoked = db.revoked().await?;
        let number = db.crl_number().await?;
        let partial = layout.crl_partial();
        remove_file_if_exists(&partial).await?;

        let result = self
            .toolkit()
            .generate_crl(&CrlRequest {
                ca_certificate: &layout.root_certificate(),
                ca_key: &layout.root_key(),
                config: &layout.openssl_config(),
                crl_number: number,
                revoked: &revoked,
                out: &partial,
            })
            .await;
        if let Err(e) = result {
            warn!(crl_number = number, error = %e, "CRL generation failed");
            remove_file_if_exists(&partial).await?;
            return Err(e);
        }

        let crl = layout.crl();
        tokio::fs::rename(&partial, &crl)
            .await
            .map_err(|e| PkiError::io(&crl, e))?;
        db.set_crl_number(number + 1).await?;

        info!(crl_number = number, revoked = revoked.len(), "CRL regenerated");
        Ok(())
    }

    /// Path of the published CRL.
    #[must_use]
    pub fn crl_path(&self) -> PathBuf {
        self.inner.layout.crl()
    }

    /// Serials listed in the published CRL. Lock-free.
    pub async fn crl_revoked_serials(&self) -> Result<BTreeSet<Serial>> {
        read_revoked_serials(&self.inner.layout.crl()).await
    }
}
