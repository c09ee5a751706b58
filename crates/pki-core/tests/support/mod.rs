//! In-process PKI toolkit for integration tests.
//!
//! Produces real X.509 certificates and CRLs with `rcgen`, so the status
//! evaluator parses the same structures it sees in production. CSRs and
//! bundles are plain-text stand-ins.

#![allow(dead_code)]

use async_trait::async_trait;
use pki_core::toolkit::{
    BundleRequest, CrlRequest, CsrRequest, KeyRequest, PkiToolkit, RootRequest, SignRequest,
    Subject,
};
use pki_core::{Authority, PkiConfig, PkiError, Result};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateRevocationListParams,
    DistinguishedName, DnType, IsCa, KeyIdMethod, KeyPair, KeyUsagePurpose, RevokedCertParams,
    SerialNumber,
};
use ring::digest;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use time::{Duration, OffsetDateTime};

const BUNDLE_MAGIC: &str = "FAKE-PKCS12";

/// Test double for [`PkiToolkit`] with optional failure injection.
#[derive(Debug, Default)]
pub struct FakeToolkit {
    fail_at: Mutex<Option<&'static str>>,
    signed: AtomicUsize,
}

impl FakeToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named operation fail from now on.
    pub fn fail_at(&self, operation: &'static str) {
        *self.fail_at.lock().unwrap() = Some(operation);
    }

    pub fn recover(&self) {
        *self.fail_at.lock().unwrap() = None;
    }

    /// Number of certificates signed so far.
    pub fn signed(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }

    fn step(&self, operation: &'static str) -> Result<()> {
        if *self.fail_at.lock().unwrap() == Some(operation) {
            Err(PkiError::toolkit(operation, "injected failure"))
        } else {
            Ok(())
        }
    }
}

fn fail(operation: &'static str, e: impl std::fmt::Display) -> PkiError {
    PkiError::toolkit(operation, e)
}

async fn read_string(operation: &'static str, path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| fail(operation, format!("{}: {e}", path.display())))
}

async fn write(operation: &'static str, path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| fail(operation, format!("{}: {e}", path.display())))
}

fn distinguished_name(subject: &Subject) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    if let Some(o) = subject.get("O") {
        dn.push(DnType::OrganizationName, o);
    }
    if let Some(cn) = subject.get("CN") {
        dn.push(DnType::CommonName, cn);
    }
    dn
}

/// Rebuild the issuer from its key. Signing only needs the name and key.
fn issuer(operation: &'static str, key: &KeyPair) -> Result<Certificate> {
    let mut params = CertificateParams::new(Vec::<String>::new()).map_err(|e| fail(operation, e))?;
    params.distinguished_name = distinguished_name(&Subject::new().with("CN", "Test Root"));
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.self_signed(key).map_err(|e| fail(operation, e))
}

async fn load_key(operation: &'static str, path: &Path) -> Result<KeyPair> {
    KeyPair::from_pem(&read_string(operation, path).await?).map_err(|e| fail(operation, e))
}

fn password_digest(password: &str) -> String {
    hex::encode(digest::digest(&digest::SHA256, password.as_bytes()).as_ref())
}

#[async_trait]
impl PkiToolkit for FakeToolkit {
    async fn generate_key(&self, request: &KeyRequest<'_>) -> Result<()> {
        self.step("generate_key")?;
        let key = KeyPair::generate().map_err(|e| fail("generate_key", e))?;
        write("generate_key", request.out, key.serialize_pem()).await
    }

    async fn generate_csr(&self, request: &CsrRequest<'_>) -> Result<()> {
        self.step("generate_csr")?;
        let csr = format!("{}\n{}\n", request.subject, request.key.display());
        write("generate_csr", request.out, csr).await
    }

    async fn self_sign_root(&self, request: &RootRequest<'_>) -> Result<()> {
        self.step("self_sign_root")?;
        let key = load_key("self_sign_root", request.key).await?;
        let root = issuer("self_sign_root", &key)?;
        write("self_sign_root", request.out, root.pem()).await
    }

    async fn sign_certificate(&self, request: &SignRequest<'_>) -> Result<()> {
        self.step("sign_certificate")?;
        let csr = read_string("sign_certificate", request.csr).await?;
        let mut lines = csr.lines();
        let subject = Subject::parse(lines.next().unwrap_or_default());
        let key_path = lines.next().unwrap_or_default();

        let leaf_key = load_key("sign_certificate", Path::new(key_path)).await?;
        let ca_key = load_key("sign_certificate", request.ca_key).await?;
        let ca = issuer("sign_certificate", &ca_key)?;

        let serial = request
            .serial
            .to_u64()
            .ok_or_else(|| fail("sign_certificate", "serial out of range"))?;
        let now = OffsetDateTime::now_utc();
        let mut params =
            CertificateParams::new(Vec::<String>::new()).map_err(|e| fail("sign_certificate", e))?;
        params.distinguished_name = distinguished_name(&subject);
        params.serial_number = Some(SerialNumber::from(serial));
        params.not_before = now - Duration::minutes(1);
        params.not_after = now + Duration::days(i64::from(request.days));

        let cert = params
            .signed_by(&leaf_key, &ca, &ca_key)
            .map_err(|e| fail("sign_certificate", e))?;
        write("sign_certificate", request.out, cert.pem()).await?;
        self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn generate_crl(&self, request: &CrlRequest<'_>) -> Result<()> {
        self.step("generate_crl")?;
        let ca_key = load_key("generate_crl", request.ca_key).await?;
        let ca = issuer("generate_crl", &ca_key)?;

        let mut revoked_certs = Vec::new();
        for entry in request.revoked {
            let serial = entry
                .serial
                .to_u64()
                .ok_or_else(|| fail("generate_crl", "serial out of range"))?;
            let revocation_time = OffsetDateTime::from_unix_timestamp(entry.revoked_at.timestamp())
                .map_err(|e| fail("generate_crl", e))?;
            revoked_certs.push(RevokedCertParams {
                serial_number: SerialNumber::from(serial),
                revocation_time,
                reason_code: None,
                invalidity_date: None,
            });
        }

        let now = OffsetDateTime::now_utc();
        let crl = CertificateRevocationListParams {
            this_update: now,
            next_update: now + Duration::days(30),
            crl_number: SerialNumber::from(request.crl_number),
            issuing_distribution_point: None,
            revoked_certs,
            key_identifier_method: KeyIdMethod::Sha256,
        }
        .signed_by(&ca, &ca_key)
        .map_err(|e| fail("generate_crl", e))?;
        write("generate_crl", request.out, crl.der().to_vec()).await
    }

    async fn export_bundle(&self, request: &BundleRequest<'_>) -> Result<()> {
        self.step("export_bundle")?;
        let chain = read_string("export_bundle", request.chain).await?;
        let key = read_string("export_bundle", request.key).await?;
        let bundle = format!(
            "{BUNDLE_MAGIC}\n{}\n{chain}{key}",
            password_digest(request.password)
        );
        write("export_bundle", request.out, bundle).await
    }

    async fn verify_bundle(&self, bundle: &Path, password: &str) -> Result<()> {
        self.step("verify_bundle")?;
        let content = read_string("verify_bundle", bundle).await?;
        let mut lines = content.lines();
        if lines.next() != Some(BUNDLE_MAGIC) {
            return Err(fail("verify_bundle", "not a bundle"));
        }
        if lines.next() == Some(password_digest(password).as_str()) {
            Ok(())
        } else {
            Err(fail("verify_bundle", "mac verify failure"))
        }
    }
}

/// A storage root in a temp dir with an authority over the fake toolkit.
pub struct TestCa {
    pub dir: TempDir,
    pub toolkit: Arc<FakeToolkit>,
    pub authority: Authority,
}

impl TestCa {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Like [`TestCa::new`], with `configure` applied to the defaults.
    pub fn with_config(configure: impl FnOnce(&mut PkiConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let toolkit = Arc::new(FakeToolkit::new());
        let mut config = PkiConfig {
            storage_path: dir.path().join("storage"),
            ..PkiConfig::default()
        };
        configure(&mut config);
        let authority = Authority::new(config, toolkit.clone());
        Self {
            dir,
            toolkit,
            authority,
        }
    }

    pub async fn initialized() -> Self {
        let ca = Self::new();
        ca.authority.init().await.unwrap();
        ca
    }
}
