//! The certificate authority handle and its bootstrap / teardown.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::PkiConfig;
use crate::database::CaDatabase;
use crate::layout::{StorageLayout, ROOT_SUBDIRS};
use crate::lock::{GlobalLock, LockGuard};
use crate::toolkit::{render_openssl_config, KeyRequest, OpensslToolkit, PkiToolkit, RootRequest, Subject};
use crate::{PkiError, Result};

/// Handle to one CA storage root.
///
/// Cheap to clone. Holds no CA state in memory; every operation re-reads
/// the files under the global lock.
#[derive(Clone)]
pub struct Authority {
    pub(crate) inner: Arc<AuthorityInner>,
}

pub(crate) struct AuthorityInner {
    pub(crate) config: PkiConfig,
    pub(crate) layout: StorageLayout,
    pub(crate) lock: GlobalLock,
    pub(crate) db: CaDatabase,
    pub(crate) toolkit: Arc<dyn PkiToolkit>,
}

impl std::fmt::Debug for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authority")
            .field("storage", &self.inner.layout.storage())
            .finish_non_exhaustive()
    }
}

impl Authority {
    /// Create an authority backed by an arbitrary toolkit.
    pub fn new(config: PkiConfig, toolkit: Arc<dyn PkiToolkit>) -> Self {
        let layout = StorageLayout::new(&config.storage_path);
        let lock = GlobalLock::new(layout.lock_file(), config.lock_timeout());
        let db = CaDatabase::new(&layout);
        Self {
            inner: Arc::new(AuthorityInner {
                config,
                layout,
                lock,
                db,
                toolkit,
            }),
        }
    }

    /// Create an authority that shells out to `openssl`.
    #[must_use]
    pub fn with_openssl(config: PkiConfig) -> Self {
        let toolkit = Arc::new(OpensslToolkit::from_config(&config));
        Self::new(config, toolkit)
    }

    #[must_use]
    pub fn config(&self) -> &PkiConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn layout(&self) -> &StorageLayout {
        &self.inner.layout
    }

    pub(crate) fn toolkit(&self) -> &dyn PkiToolkit {
        self.inner.toolkit.as_ref()
    }

    pub(crate) fn ensure_initialized(&self) -> Result<()> {
        if self.inner.layout.is_initialized() {
            Ok(())
        } else {
            Err(PkiError::NotInitialized)
        }
    }

    /// Take the global lock on an initialized storage root.
    ///
    /// The lock file lives inside the storage root, so the check runs
    /// before acquiring and again once the lock is held.
    pub(crate) async fn lock_initialized(&self) -> Result<LockGuard> {
        self.ensure_initialized()?;
        let guard = self.inner.lock.acquire().await?;
        self.ensure_initialized()?;
        Ok(guard)
    }

    pub(crate) fn root_subject(&self) -> Subject {
        let s = &self.inner.config.subject;
        Subject::new()
            .with("C", &s.country)
            .with("O", &s.organization)
            .with("emailAddress", &s.root_email)
            .with("CN", &s.root_common_name)
    }

    /// Bootstrap the CA: directory skeleton, database, root key and
    /// certificate, and an initial empty CRL.
    ///
    /// A failure after the root area was created removes it again, so the
    /// call can be retried.
    pub async fn init(&self) -> Result<()> {
        let layout = &self.inner.layout;
        create_dir_all(layout.storage()).await?;
        create_dir_all(&layout.config_dir()).await?;

        let _guard = self.inner.lock.acquire().await?;

        let root = layout.root_dir();
        if path_exists(&root).await? {
            warn!(root = %root.display(), "refusing to initialize over an existing root area");
            return Err(PkiError::AlreadyInitialized);
        }

        let result = self.bootstrap_locked().await;
        if let Err(e) = &result {
            warn!(error = %e, "initialization failed, removing partial root area");
            remove_dir_if_exists(&root).await;
            remove_dir_if_exists(&layout.leaf_dir()).await;
        } else {
            info!(storage = %layout.storage().display(), "certificate authority initialized");
        }
        result
    }

    async fn bootstrap_locked(&self) -> Result<()> {
        let layout = &self.inner.layout;
        let root = layout.root_dir();
        for sub in ROOT_SUBDIRS {
            create_dir_all(&root.join(sub)).await?;
        }
        create_dir_all(&layout.leaf_dir()).await?;

        self.inner.db.create().await?;
        render_openssl_config(&root, &layout.openssl_config()).await?;

        let toolkit = self.toolkit();
        let root_key = layout.root_key();
        toolkit.generate_key(&KeyRequest { out: &root_key }).await?;
        toolkit
            .self_sign_root(&RootRequest {
                key: &root_key,
                subject: &self.root_subject(),
                config: &layout.openssl_config(),
                days: self.inner.config.subject.root_validity_days,
                out: &layout.root_certificate(),
            })
            .await?;

        self.write_crl_locked().await
    }

    /// Irreversibly delete the root and leaf areas.
    ///
    /// Confirmation is the caller's job.
    pub async fn clean(&self) -> Result<()> {
        let layout = &self.inner.layout;
        if !path_exists(layout.storage()).await? {
            return Ok(());
        }

        let _guard = self.inner.lock.acquire().await?;
        for dir in [layout.root_dir(), layout.leaf_dir()] {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(PkiError::io(&dir, e)),
            }
        }
        info!(storage = %layout.storage().display(), "certificate authority removed");
        Ok(())
    }
}

pub(crate) async fn create_dir_all(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| PkiError::io(path, e))
}

pub(crate) async fn path_exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| PkiError::io(path, e))
}

/// Remove a file, treating absence as success.
pub(crate) async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PkiError::io(path, e)),
    }
}

async fn remove_dir_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "cleanup failed");
        }
    }
}
