//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the certificate authority engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkiConfig {
    /// Storage root holding `config/`, `root/`, `leaf/` and the lock file.
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// Path to the `openssl` binary.
    #[serde(default = "default_openssl")]
    pub openssl: PathBuf,

    /// RSA modulus size for generated keys.
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,

    /// Wall-clock limit for a single toolkit invocation (seconds).
    #[serde(default = "default_toolkit_timeout")]
    pub toolkit_timeout_secs: u64,

    /// Bounded wait for the global lock (seconds). Unset blocks indefinitely.
    #[serde(default)]
    pub lock_timeout_secs: Option<u64>,

    /// Days before expiry at which a certificate is reported as `WARN`.
    #[serde(default = "default_warn_days")]
    pub warn_days: u32,

    /// Lifetime of a portal session token (seconds).
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Distinguished-name templates.
    #[serde(default)]
    pub subject: SubjectConfig,
}

/// Distinguished-name attributes used for the root and leaf subjects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectConfig {
    #[serde(default = "default_country")]
    pub country: String,

    #[serde(default = "default_organization")]
    pub organization: String,

    /// Organizational unit for user certificates.
    #[serde(default = "default_user_unit")]
    pub user_unit: String,

    /// Organizational unit for service certificates.
    #[serde(default = "default_service_unit")]
    pub service_unit: String,

    /// Domain appended to a user's common name for the email attribute.
    #[serde(default = "default_email_domain")]
    pub email_domain: String,

    #[serde(default = "default_root_common_name")]
    pub root_common_name: String,

    #[serde(default = "default_root_email")]
    pub root_email: String,

    /// Validity of the self-signed root certificate.
    #[serde(default = "default_root_validity_days")]
    pub root_validity_days: u32,
}

impl Default for PkiConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            openssl: default_openssl(),
            key_bits: default_key_bits(),
            toolkit_timeout_secs: default_toolkit_timeout(),
            lock_timeout_secs: None,
            warn_days: default_warn_days(),
            session_ttl_secs: default_session_ttl(),
            subject: SubjectConfig::default(),
        }
    }
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            country: default_country(),
            organization: default_organization(),
            user_unit: default_user_unit(),
            service_unit: default_service_unit(),
            email_domain: default_email_domain(),
            root_common_name: default_root_common_name(),
            root_email: default_root_email(),
            root_validity_days: default_root_validity_days(),
        }
    }
}

impl PkiConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| crate::PkiError::io(path, e))?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from TOML text.
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| crate::PkiError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::Result<()> {
        if self.key_bits < 2048 {
            return Err(crate::PkiError::Config(format!(
                "key_bits must be at least 2048, got {}",
                self.key_bits
            )));
        }
        if self.toolkit_timeout_secs == 0 {
            return Err(crate::PkiError::Config(
                "toolkit_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn toolkit_timeout(&self) -> Duration {
        Duration::from_secs(self.toolkit_timeout_secs)
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn warn_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.warn_days))
    }
}

// Default value functions for serde.
fn default_storage_path() -> PathBuf {
    PathBuf::from("storage")
}

fn default_openssl() -> PathBuf {
    PathBuf::from("openssl")
}

const fn default_key_bits() -> u32 {
    4096
}

const fn default_toolkit_timeout() -> u64 {
    120
}

const fn default_warn_days() -> u32 {
    10
}

const fn default_session_ttl() -> u64 {
    600
}

fn default_country() -> String {
    String::from("KR")
}

fn default_organization() -> String {
    String::from("SPARCS")
}

fn default_user_unit() -> String {
    String::from("SPARCS Users")
}

fn default_service_unit() -> String {
    String::from("SPARCS Services")
}

fn default_email_domain() -> String {
    String::from("sparcs.org")
}

fn default_root_common_name() -> String {
    String::from("SPARCS")
}

fn default_root_email() -> String {
    String::from("staff@sparcs.org")
}

const fn default_root_validity_days() -> u32 {
    3650
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PkiConfig::default();
        assert_eq!(config.key_bits, 4096);
        assert_eq!(config.warn_days, 10);
        assert_eq!(config.session_ttl_secs, 600);
        assert!(config.lock_timeout().is_none());
        assert_eq!(config.subject.email_domain, "sparcs.org");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PkiConfig::from_toml(
            r#"
            storage_path = "/var/lib/pki"
            lock_timeout_secs = 30

            [subject]
            organization = "Example"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage_path, PathBuf::from("/var/lib/pki"));
        assert_eq!(config.lock_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.subject.organization, "Example");
        assert_eq!(config.subject.country, "KR");
        assert_eq!(config.toolkit_timeout_secs, 120);
    }

    #[test]
    fn test_rejects_weak_keys() {
        let err = PkiConfig::from_toml("key_bits = 1024").unwrap_err();
        assert!(matches!(err, crate::PkiError::Config(_)));
    }

    #[test]
    fn test_unknown_tables_are_ignored() {
        let config = PkiConfig::from_toml("[web]\nlisten = \"127.0.0.1:8080\"\n").unwrap();
        assert_eq!(config.warn_days, 10);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = PkiConfig::load(Path::new("/nonexistent/pki.toml")).unwrap();
        assert_eq!(config.openssl, PathBuf::from("openssl"));
    }
}
