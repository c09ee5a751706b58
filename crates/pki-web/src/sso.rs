//! Client for the SPARCS SSO v2 provider.

use chrono::Utc;
use reqwest::Client as HttpClient;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::{Result, WebError};

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes of randomness in the login `state`.
const STATE_BYTES: usize = 10;

/// Identity returned for a login code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    pub sparcs_id: String,
    pub sid: String,
}

/// SSO client. Cheap to clone.
#[derive(Clone)]
pub struct SsoClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: HttpClient,
    client_id: String,
    key: hmac::Key,
    base_url: String,
    rng: SystemRandom,
}

impl std::fmt::Debug for SsoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoClient")
            .field("client_id", &self.inner.client_id)
            .field("base_url", &self.inner.base_url)
            .finish_non_exhaustive()
    }
}

impl SsoClient {
    #[must_use]
    pub fn builder(client_id: impl Into<String>, client_key: impl Into<String>) -> SsoClientBuilder {
        SsoClientBuilder::new(client_id, client_key)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v2/{path}", self.inner.base_url)
    }

    /// Hex HMAC-SHA-256 over the concatenated parts.
    fn sign(&self, parts: &[&str]) -> String {
        let mut ctx = hmac::Context::with_key(&self.inner.key);
        for part in parts {
            ctx.update(part.as_bytes());
        }
        hex::encode(ctx.sign().as_ref())
    }

    /// Login redirect URL and the random `state` it carries.
    pub fn login_params(&self) -> Result<(String, String)> {
        let mut bytes = [0u8; STATE_BYTES];
        self.inner
            .rng
            .fill(&mut bytes)
            .map_err(|_| WebError::Sso("failed to generate login state".into()))?;
        let state = hex::encode(bytes);

        let url = Url::parse_with_params(
            &self.endpoint("token/require/"),
            &[("client_id", self.inner.client_id.as_str()), ("state", state.as_str())],
        )
        .map_err(|e| WebError::Sso(e.to_string()))?;
        Ok((url.into(), state))
    }

    /// Exchange a login `code` for the user's identity.
    pub async fn user_info(&self, code: &str) -> Result<UserInfo> {
        let timestamp = Utc::now().timestamp().to_string();
        let sign = self.sign(&[code, timestamp.as_str()]);
        let url = self.endpoint("token/info/");
        debug!(url = %url, "POST form request");

        let response = self
            .inner
            .http
            .post(&url)
            .form(&[
                ("client_id", self.inner.client_id.as_str()),
                ("code", code),
                ("timestamp", timestamp.as_str()),
                ("sign", sign.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "SSO rejected login code");
            return Err(WebError::Sso(format!("status {status}: {body}")));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| WebError::Sso(format!("invalid user info: {e}")))
    }

    /// Provider logout URL that returns the browser to `redirect_uri`.
    pub fn logout_url(&self, sid: &str, redirect_uri: &str) -> Result<String> {
        let timestamp = Utc::now().timestamp().to_string();
        let sign = self.sign(&[sid, redirect_uri, timestamp.as_str()]);
        let url = Url::parse_with_params(
            &self.endpoint("logout/"),
            &[
                ("client_id", self.inner.client_id.as_str()),
                ("sid", sid),
                ("timestamp", timestamp.as_str()),
                ("redirect_uri", redirect_uri),
                ("sign", sign.as_str()),
            ],
        )
        .map_err(|e| WebError::Sso(e.to_string()))?;
        Ok(url.into())
    }
}

/// Builder for configuring an [`SsoClient`]
pub struct SsoClientBuilder {
    client_id: String,
    client_key: String,
    base_url: String,
    timeout: Duration,
}

impl SsoClientBuilder {
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_key: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_key: client_key.into(),
            base_url: "https://sparcssso.kaist.ac.kr".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the base URL (useful for testing)
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<SsoClient> {
        let http = HttpClient::builder()
            .timeout(self.timeout)
            .user_agent(format!("pki-web/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(SsoClient {
            inner: Arc::new(ClientInner {
                http,
                key: hmac::Key::new(hmac::HMAC_SHA256, self.client_key.as_bytes()),
                client_id: self.client_id,
                base_url: self.base_url,
                rng: SystemRandom::new(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> SsoClient {
        SsoClient::builder("test-client", "test-key")
            .base_url(base)
            .build()
            .unwrap()
    }

    fn query(url: &str) -> Vec<(String, String)> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn test_login_params_carry_fresh_state() {
        let sso = client("https://sso.example.org/");
        let (url, state) = sso.login_params().unwrap();
        let (_, other) = sso.login_params().unwrap();

        assert!(url.starts_with("https://sso.example.org/api/v2/token/require/?"));
        assert_eq!(state.len(), STATE_BYTES * 2);
        assert_ne!(state, other);
        let pairs = query(&url);
        assert!(pairs.contains(&("client_id".into(), "test-client".into())));
        assert!(pairs.contains(&("state".into(), state)));
    }

    #[test]
    fn test_logout_url_is_signed() {
        let sso = client("https://sso.example.org");
        let url = sso.logout_url("sid-1", "https://pki.example.org").unwrap();
        let pairs = query(&url);
        let get = |k: &str| pairs.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());

        assert_eq!(get("sid").as_deref(), Some("sid-1"));
        assert_eq!(get("redirect_uri").as_deref(), Some("https://pki.example.org"));
        let timestamp = get("timestamp").unwrap();
        let expected = sso.sign(&["sid-1", "https://pki.example.org", timestamp.as_str()]);
        assert_eq!(get("sign"), Some(expected));
    }

    #[tokio::test]
    async fn test_user_info_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/token/info/"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("client_id=test-client"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sparcs_id": "alice",
                "sid": "sid-42",
                "email": "alice@sparcs.org"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let info = client(&server.uri()).user_info("abc").await.unwrap();
        assert_eq!(
            info,
            UserInfo {
                sparcs_id: "alice".into(),
                sid: "sid-42".into()
            }
        );
    }

    #[tokio::test]
    async fn test_user_info_rejected_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/token/info/"))
            .respond_with(ResponseTemplate::new(403).set_body_string("invalid code"))
            .mount(&server)
            .await;

        let err = client(&server.uri()).user_info("bad").await.unwrap_err();
        assert!(matches!(err, WebError::Sso(ref m) if m.contains("403")));
    }

    #[tokio::test]
    async fn test_user_info_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/token/info/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let err = client(&server.uri()).user_info("abc").await.unwrap_err();
        assert!(matches!(err, WebError::Sso(_)));
    }
}
