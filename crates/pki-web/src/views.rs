//! HTML views.

use chrono::{DateTime, Utc};
use maud::{html, Markup, PreEscaped, DOCTYPE};
use pki_core::CertState;

/// Data behind the home page.
#[derive(Debug, Clone)]
pub struct HomePage<'a> {
    /// Empty when anonymous.
    pub username: &'a str,
    pub session_remaining_secs: i64,
    /// `None` when anonymous or the state could not be read.
    pub state: Option<CertState>,
    pub expires: Option<DateTime<Utc>>,
    pub crl_route: &'a str,
}

pub fn layout(title: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
                style {
                    (PreEscaped(r"
                        body { font-family: system-ui; max-width: 640px; margin: 50px auto; padding: 20px; color: #212529; }
                        .card { padding: 24px; border: 1px solid #dee2e6; border-radius: 8px; }
                        .state { font-weight: 600; text-transform: uppercase; }
                        .state-ok { color: #0f5132; }
                        .state-warn { color: #997404; }
                        .state-expired, .state-revoked { color: #842029; }
                        a.button { display: inline-block; background: #0056b3; color: #fff; padding: 10px 20px; border-radius: 4px; text-decoration: none; margin-top: 12px; }
                        footer { margin-top: 24px; font-size: 13px; color: #6c757d; }
                    "))
                }
            }
            body {
                div.card { (content) }
            }
        }
    }
}

const fn action_label(state: CertState) -> &'static str {
    match state {
        CertState::None => "Issue certificate",
        CertState::Ok => "Download certificate",
        CertState::Warn => "Renew certificate",
        CertState::Expired | CertState::Revoked => "Reissue certificate",
    }
}

pub fn home(page: &HomePage<'_>) -> Markup {
    let content = html! {
        h1 { "SPARCS PKI" }
        @if page.username.is_empty() {
            p { "Sign in with SPARCS SSO to get your client certificate." }
            a.button href="/login" { "Login" }
        } @else {
            p {
                "Signed in as " strong { (page.username) }
                " (session expires in " (page.session_remaining_secs) "s). "
                a href="/logout" { "Logout" }
            }
            @match page.state {
                Some(state) => {
                    p {
                        "Certificate: "
                        span class={ "state state-" (state.as_str()) } { (state.as_str()) }
                        @if let Some(expires) = page.expires {
                            " until " (expires.format("%Y-%m-%d %H:%M UTC"))
                        }
                    }
                    a.button href="/action" { (action_label(state)) }
                }
                None => {
                    p { "Certificate state is unavailable." }
                }
            }
        }
        footer {
            a href=(page.crl_route) { "Certificate revocation list" }
        }
    };
    layout("SPARCS PKI", content)
}

/// Alert and go back, for failures on link-driven endpoints.
pub fn alert_back(message: &str) -> Markup {
    let literal = serde_json::to_string(message).unwrap_or_else(|_| "\"\"".into());
    html! {
        script { (PreEscaped(format!("alert({literal}); window.history.back();"))) }
    }
}
