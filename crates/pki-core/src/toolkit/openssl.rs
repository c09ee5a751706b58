//! `openssl` command-line backend.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{BundleRequest, CrlRequest, CsrRequest, KeyRequest, PkiToolkit, RootRequest, SignRequest};
use crate::config::PkiConfig;
use crate::database::write_atomic;
use crate::{PkiError, Result};

/// Environment variable carrying bundle passwords to the child process.
const PASSWORD_ENV: &str = "PKI_BUNDLE_PASSWORD";

/// Runs each toolkit operation as one `openssl` invocation.
#[derive(Debug, Clone)]
pub struct OpensslToolkit {
    program: PathBuf,
    key_bits: u32,
    timeout: Duration,
}

impl OpensslToolkit {
    pub fn new(program: impl Into<PathBuf>, key_bits: u32, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            key_bits,
            timeout,
        }
    }

    #[must_use]
    pub fn from_config(config: &PkiConfig) -> Self {
        Self::new(&config.openssl, config.key_bits, config.toolkit_timeout())
    }

    async fn run(
        &self,
        operation: &'static str,
        args: Vec<OsString>,
        password: Option<&str>,
    ) -> Result<()> {
        debug!(
            program = %self.program.display(),
            operation,
            subcommand = ?args.first(),
            "invoking toolkit"
        );

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(password) = password {
            command.env(PASSWORD_ENV, password);
        }

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|e| PkiError::toolkit(operation, e))?,
            Err(_) => {
                warn!(operation, "toolkit invocation timed out");
                return Err(PkiError::ToolkitTimeout {
                    operation,
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map_or_else(|| output.status.to_string(), str::to_string);
            warn!(operation, status = %output.status, reason = %reason, "toolkit failed");
            Err(PkiError::toolkit(operation, reason))
        }
    }
}

/// Collect string flags and paths into one argument list.
macro_rules! os_args {
    ($($arg:expr),* $(,)?) => {
        vec![$(OsString::from($arg)),*]
    };
}

#[async_trait]
impl PkiToolkit for OpensslToolkit {
    async fn generate_key(&self, request: &KeyRequest<'_>) -> Result<()> {
        let bits = self.key_bits.to_string();
        self.run(
            "generate_key",
            os_args!["genrsa", "-out", request.out, &bits],
            None,
        )
        .await
    }

    async fn generate_csr(&self, request: &CsrRequest<'_>) -> Result<()> {
        let subject = request.subject.to_string();
        self.run(
            "generate_csr",
            os_args![
                "req", "-new", "-config", request.config, "-key", request.key, "-subj",
                &subject, "-out", request.out,
            ],
            None,
        )
        .await
    }

    async fn self_sign_root(&self, request: &RootRequest<'_>) -> Result<()> {
        let subject = request.subject.to_string();
        let days = request.days.to_string();
        self.run(
            "self_sign_root",
            os_args![
                "req", "-new", "-x509", "-config", request.config, "-key", request.key,
                "-subj", &subject, "-days", &days, "-sha256", "-extensions", "v3_ca",
                "-out", request.out,
            ],
            None,
        )
        .await
    }

    async fn sign_certificate(&self, request: &SignRequest<'_>) -> Result<()> {
        let serial = format!("0x{}", request.serial);
        let days = request.days.to_string();
        self.run(
            "sign_certificate",
            os_args![
                "x509", "-req", "-in", request.csr, "-CA", request.ca_certificate, "-CAkey",
                request.ca_key, "-set_serial", &serial, "-days", &days, "-sha256",
                "-extfile", request.config, "-extensions", request.extension, "-out",
                request.out,
            ],
            None,
        )
        .await
    }

    async fn generate_crl(&self, request: &CrlRequest<'_>) -> Result<()> {
        // `openssl ca` reads index.txt and crlnumber itself; the engine has
        // already written both, so `request.revoked` is informational here.
        self.run(
            "generate_crl",
            os_args!["ca", "-gencrl", "-batch", "-config", request.config, "-out", request.out],
            None,
        )
        .await
    }

    async fn export_bundle(&self, request: &BundleRequest<'_>) -> Result<()> {
        let passout = format!("env:{PASSWORD_ENV}");
        self.run(
            "export_bundle",
            os_args![
                "pkcs12", "-export", "-in", request.chain, "-inkey", request.key, "-out",
                request.out, "-passout", &passout,
            ],
            Some(request.password),
        )
        .await
    }

    async fn verify_bundle(&self, bundle: &Path, password: &str) -> Result<()> {
        let passin = format!("env:{PASSWORD_ENV}");
        self.run(
            "verify_bundle",
            os_args!["pkcs12", "-in", bundle, "-noout", "-passin", &passin],
            Some(password),
        )
        .await
    }
}

const OPENSSL_CONFIG_TEMPLATE: &str = r"# Generated by pki init. Paths point into the storage root.

[ ca ]
default_ca = CA_default

[ CA_default ]
dir               = {root_path}
certs             = $dir/certs
crl_dir           = $dir/crl
new_certs_dir     = $dir/newcerts
database          = $dir/index.txt
serial            = $dir/serial
crlnumber         = $dir/crlnumber
certificate       = $dir/certs/root.crt
private_key       = $dir/private/root.key
crl               = $dir/crl/root.crl
crl_extensions    = crl_ext
default_crl_days  = 30
default_md        = sha256
unique_subject    = no
policy            = policy_loose

[ policy_loose ]
countryName             = optional
stateOrProvinceName     = optional
localityName            = optional
organizationName        = optional
organizationalUnitName  = optional
commonName              = supplied
emailAddress            = optional

[ req ]
default_bits        = 4096
distinguished_name  = req_distinguished_name
string_mask         = utf8only
default_md          = sha256

[ req_distinguished_name ]

[ v3_ca ]
subjectKeyIdentifier   = hash
authorityKeyIdentifier = keyid:always,issuer
basicConstraints       = critical, CA:true
keyUsage               = critical, digitalSignature, cRLSign, keyCertSign

[ usr_cert ]
basicConstraints       = CA:FALSE
subjectKeyIdentifier   = hash
authorityKeyIdentifier = keyid,issuer
keyUsage               = critical, nonRepudiation, digitalSignature, keyEncipherment
extendedKeyUsage       = clientAuth, emailProtection

[ srv_cert ]
basicConstraints       = CA:FALSE
subjectKeyIdentifier   = hash
authorityKeyIdentifier = keyid,issuer:always
keyUsage               = critical, digitalSignature, keyEncipherment
extendedKeyUsage       = serverAuth

[ crl_ext ]
authorityKeyIdentifier = keyid:always
";

/// Write the OpenSSL configuration for a CA rooted at `root_dir`.
pub async fn render_openssl_config(root_dir: &Path, out: &Path) -> Result<()> {
    let rendered =
        OPENSSL_CONFIG_TEMPLATE.replace("{root_path}", &root_dir.display().to_string());
    write_atomic(out, rendered.as_bytes()).await
}
