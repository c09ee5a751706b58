//! Portal settings: the engine config plus a `[web]` table.

use pki_core::PkiConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::{Result, WebError};

/// Environment variables that override secrets from the file.
pub const ENV_SECRET_KEY: &str = "PKI_SECRET_KEY";
pub const ENV_SSO_CLIENT_ID: &str = "PKI_SSO_CLIENT_ID";
pub const ENV_SSO_CLIENT_KEY: &str = "PKI_SSO_CLIENT_KEY";

/// Everything the portal binary reads from `pki.toml`.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub pki: PkiConfig,
    pub web: WebConfig,
}

/// `[web]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// HMAC key for session cookies.
    #[serde(default)]
    pub secret_key: String,

    #[serde(default)]
    pub sso_client_id: String,

    #[serde(default)]
    pub sso_client_key: String,

    #[serde(default = "default_sso_base_url")]
    pub sso_base_url: String,

    /// Public address of the portal, used as the logout return address.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Drops the `Secure` cookie flag for local HTTP testing.
    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_crl_route")]
    pub crl_route: String,
}

#[derive(Deserialize)]
struct WebSection {
    #[serde(default)]
    web: WebConfig,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            secret_key: String::new(),
            sso_client_id: String::new(),
            sso_client_key: String::new(),
            sso_base_url: default_sso_base_url(),
            public_url: default_public_url(),
            debug: false,
            crl_route: default_crl_route(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = if path.exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };
        let mut settings = Self::from_toml(&content)?;
        settings
            .web
            .apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
        settings.web.validate()?;
        Ok(settings)
    }

    /// Parse both tables from TOML text. Does not validate secrets.
    pub fn from_toml(content: &str) -> Result<Self> {
        let pki = PkiConfig::from_toml(content)?;
        let section: WebSection =
            toml::from_str(content).map_err(|e| WebError::Config(e.to_string()))?;
        Ok(Self {
            pki,
            web: section.web,
        })
    }
}

impl WebConfig {
    /// Replace secrets with values from `lookup` where present.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(ENV_SECRET_KEY) {
            self.secret_key = v;
        }
        if let Some(v) = lookup(ENV_SSO_CLIENT_ID) {
            self.sso_client_id = v;
        }
        if let Some(v) = lookup(ENV_SSO_CLIENT_KEY) {
            self.sso_client_key = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.secret_key.is_empty() {
            return Err(WebError::Config(format!(
                "secret_key must be set (or {ENV_SECRET_KEY})"
            )));
        }
        if !self.crl_route.starts_with('/') {
            return Err(WebError::Config(format!(
                "crl_route must start with '/', got {:?}",
                self.crl_route
            )));
        }
        Ok(())
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 22223))
}

fn default_sso_base_url() -> String {
    "https://sparcssso.kaist.ac.kr".into()
}

fn default_public_url() -> String {
    "http://localhost:22223".into()
}

fn default_crl_route() -> String {
    "/sparcs.crl".into()
}
