//! Stateless HMAC session tokens.
//!
//! Wire format: `username:session_id:expiry:hexmac`, where `hexmac` is the
//! lowercase hex HMAC-SHA-256 of `username:session_id:expiry` under the
//! server secret and `expiry` is in epoch seconds.

use chrono::Utc;
use ring::hmac;
use std::fmt;
use std::time::Duration;
use subtle::{Choice, ConstantTimeEq};

use crate::{PkiError, Result};

/// Hex length of an HMAC-SHA-256 tag.
const MAC_HEX_LEN: usize = 64;

/// Identity carried by a verified token. Anonymous when `username` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub session_id: String,
    /// Expiry in epoch seconds; 0 for anonymous sessions.
    pub expires: i64,
}

impl Session {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.username.is_empty()
    }

    /// Seconds left before expiry, never negative.
    #[must_use]
    pub fn remaining_secs(&self, now: i64) -> i64 {
        (self.expires - now).max(0)
    }
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct SessionAuthenticator {
    key: hmac::Key,
    ttl: Duration,
}

impl fmt::Debug for SessionAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuthenticator")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionAuthenticator {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            ttl,
        }
    }

    fn sign(&self, payload: &str) -> String {
        hex::encode(hmac::sign(&self.key, payload.as_bytes()).as_ref())
    }

    /// Issue a token valid for the configured TTL from now.
    pub fn issue_token(&self, username: &str, session_id: &str) -> Result<String> {
        self.issue_token_at(username, session_id, Utc::now().timestamp())
    }

    pub fn issue_token_at(&self, username: &str, session_id: &str, now: i64) -> Result<String> {
        if username.is_empty() || username.contains(':') || session_id.contains(':') {
            return Err(PkiError::InvalidToken);
        }
        let ttl = i64::try_from(self.ttl.as_secs()).map_err(|_| PkiError::InvalidToken)?;
        let payload = format!("{username}:{session_id}:{}", now.saturating_add(ttl));
        let mac = self.sign(&payload);
        Ok(format!("{payload}:{mac}"))
    }

    pub fn verify_token(&self, token: &str) -> Result<Session> {
        self.verify_token_at(token, Utc::now().timestamp())
    }

    /// Verify `token` as of `now` (epoch seconds).
    pub fn verify_token_at(&self, token: &str, now: i64) -> Result<Session> {
        let fields: Vec<&str> = token.split(':').collect();
        let [username, session_id, expiry, presented] = fields[..] else {
            return Err(PkiError::InvalidToken);
        };

        let expected = self.sign(&format!("{username}:{session_id}:{expiry}"));
        if !mac_matches(expected.as_bytes(), presented.as_bytes()) {
            return Err(PkiError::InvalidToken);
        }

        let expires: i64 = expiry.parse().map_err(|_| PkiError::InvalidToken)?;
        if username.is_empty() || now >= expires {
            return Err(PkiError::InvalidToken);
        }

        Ok(Session {
            username: username.to_string(),
            session_id: session_id.to_string(),
            expires,
        })
    }

    /// Resolve an optional cookie value to a session, anonymous on any failure.
    pub fn session(&self, token: Option<&str>) -> Session {
        self.session_at(token, Utc::now().timestamp())
    }

    pub fn session_at(&self, token: Option<&str>, now: i64) -> Session {
        token
            .and_then(|t| self.verify_token_at(t, now).ok())
            .unwrap_or_default()
    }
}

/// Constant-time in the content and the length of `presented`.
fn mac_matches(expected: &[u8], presented: &[u8]) -> bool {
    let mut buf = [0u8; MAC_HEX_LEN];
    let n = presented.len().min(MAC_HEX_LEN);
    buf[..n].copy_from_slice(&presented[..n]);

    let same_len = Choice::from(u8::from(presented.len() == MAC_HEX_LEN));
    (buf.as_slice().ct_eq(expected) & same_len).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_790_000_000;

    fn auth() -> SessionAuthenticator {
        SessionAuthenticator::new(b"portal-secret", Duration::from_secs(600))
    }

    #[test]
    fn test_issued_token_verifies() {
        let auth = auth();
        let token = auth.issue_token_at("alice", "sid-1", NOW).unwrap();
        let session = auth.verify_token_at(&token, NOW + 599).unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(session.session_id, "sid-1");
        assert_eq!(session.expires, NOW + 600);
        assert_eq!(session.remaining_secs(NOW + 100), 500);
    }

    #[test]
    fn test_wire_format_matches_hmac_sha256_hex() {
        let auth = auth();
        let token = auth.issue_token_at("alice", "sid-1", NOW).unwrap();
        let payload = format!("alice:sid-1:{}", NOW + 600);
        let key = hmac::Key::new(hmac::HMAC_SHA256, b"portal-secret");
        let mac = hex::encode(hmac::sign(&key, payload.as_bytes()).as_ref());
        assert_eq!(token, format!("{payload}:{mac}"));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let auth = auth();
        let token = auth.issue_token_at("alice", "sid-1", NOW).unwrap();
        assert!(auth.verify_token_at(&token, NOW + 600).is_err());
        assert!(!auth.session_at(Some(&token), NOW + 601).is_authenticated());
    }

    #[test]
    fn test_tampered_mac_is_anonymous() {
        let auth = auth();
        let token = auth.issue_token_at("alice", "sid-1", NOW).unwrap();
        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });

        assert_eq!(auth.session_at(Some(&tampered), NOW), Session::anonymous());
        assert!(!auth.session_at(Some(&token[..token.len() - 1]), NOW).is_authenticated());
    }

    #[test]
    fn test_tampered_payload_is_anonymous() {
        let auth = auth();
        let token = auth.issue_token_at("alice", "sid-1", NOW).unwrap();
        let forged = token.replacen("alice", "admin", 1);
        assert!(auth.verify_token_at(&forged, NOW).is_err());
    }

    #[test]
    fn test_wrong_field_counts_are_anonymous() {
        let auth = auth();
        let token = auth.issue_token_at("alice", "sid-1", NOW).unwrap();
        let three = token.splitn(4, ':').take(3).collect::<Vec<_>>().join(":");
        let five = format!("{token}:extra");
        for bad in [three.as_str(), five.as_str(), "", ":::"] {
            assert_eq!(auth.session_at(Some(bad), NOW), Session::anonymous(), "{bad:?}");
        }
        assert_eq!(auth.session_at(None, NOW), Session::anonymous());
    }

    #[test]
    fn test_crafted_token_with_valid_mac_authenticates() {
        let auth = auth();
        let payload = format!("bob:sid-9:{}", NOW + 60);
        let token = format!("{payload}:{}", auth.sign(&payload));
        assert_eq!(auth.session_at(Some(&token), NOW).username, "bob");
    }

    #[test]
    fn test_other_secret_is_rejected() {
        let token = auth().issue_token_at("alice", "sid-1", NOW).unwrap();
        let other = SessionAuthenticator::new(b"other", Duration::from_secs(600));
        assert!(other.verify_token_at(&token, NOW).is_err());
    }

    #[test]
    fn test_colons_in_identity_are_refused() {
        let auth = auth();
        assert!(auth.issue_token_at("al:ice", "sid", NOW).is_err());
        assert!(auth.issue_token_at("alice", "s:id", NOW).is_err());
        assert!(auth.issue_token_at("", "sid", NOW).is_err());
    }
}
