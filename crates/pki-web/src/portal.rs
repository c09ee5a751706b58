//! Self-service portal routes.
//!
//! The portal holds no state of its own: identity comes from the signed
//! `sso` cookie, certificate state from the storage root.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use pki_core::{Authority, CertState, CertificateType, PkiError, Session, SessionAuthenticator};
use serde::Deserialize;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Settings, WebConfig};
use crate::sso::SsoClient;
use crate::views::{self, HomePage};
use crate::Result;

pub const SESSION_COOKIE: &str = "sso";
pub const STATE_COOKIE: &str = "sso_state";

/// Lifetime of the login `state` cookie.
const STATE_COOKIE_MAX_AGE: u64 = 600;

const LIFECYCLE_FAILURE: &str = "Unknown error is occurred.";
const UNREGISTER_REFUSED: &str = "You CANNOT unregister.";

/// Shared handler state. Cheap to clone.
#[derive(Clone, Debug)]
pub struct AppState {
    pub authority: Authority,
    pub sessions: SessionAuthenticator,
    pub sso: SsoClient,
    pub web: Arc<WebConfig>,
}

impl AppState {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let sso = SsoClient::builder(&settings.web.sso_client_id, &settings.web.sso_client_key)
            .base_url(&settings.web.sso_base_url)
            .build()?;
        Ok(Self {
            authority: Authority::with_openssl(settings.pki.clone()),
            sessions: SessionAuthenticator::new(
                settings.web.secret_key.as_bytes(),
                Duration::from_secs(settings.pki.session_ttl_secs),
            ),
            sso,
            web: Arc::new(settings.web.clone()),
        })
    }

    fn session(&self, headers: &HeaderMap) -> Session {
        self.sessions.session(cookie_value(headers, SESSION_COOKIE))
    }
}

/// What `/action` does for a given certificate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalAction {
    /// Serve the existing bundle
    Keep,
    Issue,
    /// Rotate a certificate that is still listed as valid
    RevokeThenIssue,
    /// Drop leftovers of an already revoked certificate
    DiscardThenIssue,
}

#[must_use]
pub const fn plan_action(state: CertState) -> PortalAction {
    match state {
        CertState::Ok => PortalAction::Keep,
        CertState::None => PortalAction::Issue,
        CertState::Warn | CertState::Expired => PortalAction::RevokeThenIssue,
        CertState::Revoked => PortalAction::DiscardThenIssue,
    }
}

async fn perform(authority: &Authority, username: &str, action: PortalAction) -> pki_core::Result<()> {
    match action {
        PortalAction::Keep => return Ok(()),
        PortalAction::Issue => {}
        PortalAction::RevokeThenIssue => {
            authority.revoke(username).await?;
        }
        PortalAction::DiscardThenIssue => authority.discard(username).await?,
    }
    authority
        .issue(username, CertificateType::User, None)
        .await
        .map(|_| ())
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(home))
        .route("/login", get(login))
        .route("/login/callback", get(login_callback))
        .route("/logout", get(logout))
        .route("/unregister", get(unregister))
        .route("/action", get(action))
        .route("/crl", get(crl));
    if state.web.crl_route != "/crl" {
        router = router.route(&state.web.crl_route, get(crl));
    }
    router.with_state(state)
}

/// Value of cookie `name` from the request headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// `Set-Cookie` value. `max_age` of `Some(0)` clears the cookie.
pub fn set_cookie(name: &str, value: &str, max_age: Option<u64>, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax");
    if let Some(age) = max_age {
        cookie.push_str(&format!("; Max-Age={age}"));
    }
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

async fn home(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = state.session(&headers);
    let now = Utc::now();

    let status = if session.is_authenticated() {
        match state.authority.status(&session.username, now).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(username = %session.username, error = %e, "status evaluation failed");
                None
            }
        }
    } else {
        None
    };

    views::home(&HomePage {
        username: &session.username,
        session_remaining_secs: session.remaining_secs(now.timestamp()),
        state: status.as_ref().map(|s| s.state),
        expires: status.and_then(|s| s.expires),
        crl_route: &state.web.crl_route,
    })
    .into_response()
}

async fn login(State(state): State<AppState>) -> Response {
    match state.sso.login_params() {
        Ok((url, login_state)) => {
            let cookie = set_cookie(
                STATE_COOKIE,
                &login_state,
                Some(STATE_COOKIE_MAX_AGE),
                !state.web.debug,
            );
            (AppendHeaders([(SET_COOKIE, cookie)]), Redirect::to(&url)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "failed to build login redirect");
            Redirect::to("/").into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: String,
    #[serde(default)]
    state: String,
}

async fn login_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let expected = cookie_value(&headers, STATE_COOKIE).unwrap_or_default();
    if expected.is_empty() || expected != params.state {
        warn!("login callback with mismatching state");
        return Redirect::to("/").into_response();
    }

    let user = match state.sso.user_info(&params.code).await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "SSO login failed");
            return Redirect::to("/").into_response();
        }
    };
    let token = match state.sessions.issue_token(&user.sparcs_id, &user.sid) {
        Ok(token) => token,
        Err(e) => {
            warn!(username = %user.sparcs_id, error = %e, "refusing session for identity");
            return Redirect::to("/").into_response();
        }
    };

    info!(username = %user.sparcs_id, "signed in");
    let secure = !state.web.debug;
    (
        AppendHeaders([
            (SET_COOKIE, set_cookie(SESSION_COOKIE, &token, None, secure)),
            (SET_COOKIE, set_cookie(STATE_COOKIE, "", Some(0), secure)),
        ]),
        Redirect::to("/"),
    )
        .into_response()
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = state.session(&headers);
    if !session.is_authenticated() {
        return Redirect::to("/").into_response();
    }

    let target = state
        .sso
        .logout_url(&session.session_id, &state.web.public_url)
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to build logout URL");
            "/".to_string()
        });
    info!(username = %session.username, "signed out");
    (
        AppendHeaders([(
            SET_COOKIE,
            set_cookie(SESSION_COOKIE, "", Some(0), !state.web.debug),
        )]),
        Redirect::to(&target),
    )
        .into_response()
}

async fn unregister() -> Html<String> {
    Html(views::alert_back(UNREGISTER_REFUSED).into_string())
}

async fn action(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = state.session(&headers);
    if !session.is_authenticated() {
        return Redirect::to("/login").into_response();
    }
    let username = session.username.as_str();

    let result = async {
        let status = state.authority.status(username, Utc::now()).await?;
        let action = plan_action(status.state);
        info!(username, state = ?status.state, action = ?action, "portal action");
        match perform(&state.authority, username, action).await {
            // Issued by a concurrent request, or left without a certificate.
            Err(PkiError::AlreadyIssued { .. }) => {
                info!(username, "bundle already present, keeping it");
            }
            other => other?,
        }
        let bundle = state
            .authority
            .bundle_path(username)
            .await?
            .ok_or_else(|| PkiError::NotFound {
                common_name: username.to_string(),
            })?;
        tokio::fs::read(&bundle)
            .await
            .map_err(|e| PkiError::io(&bundle, e))
    }
    .await;

    match result {
        Ok(bytes) => (
            [
                (CONTENT_TYPE, "application/x-pkcs12".to_string()),
                (
                    CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{username}.p12\""),
                ),
                (CACHE_CONTROL, "no-store".to_string()),
            ],
            Body::from(bytes),
        )
            .into_response(),
        Err(e) => {
            warn!(username, error = %e, "portal action failed");
            Html(views::alert_back(LIFECYCLE_FAILURE).into_string()).into_response()
        }
    }
}

async fn crl(State(state): State<AppState>) -> Response {
    let path = state.authority.crl_path();
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(CONTENT_TYPE, "application/pkix-crl")], bytes).into_response(),
        Err(e) if e.kind() == ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read CRL");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
