//! # pki-web
//!
//! Self-service portal for the private certificate authority. Users sign
//! in through SPARCS SSO and download a client certificate bundle for
//! their account; the portal renews, rotates or reissues it as needed.
//!
//! ## Routes
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `/` | Home page with the certificate state |
//! | `/login`, `/login/callback`, `/logout` | SSO round trip |
//! | `/action` | Issue or fetch the bundle |
//! | `/crl` and `crl_route` | Current revocation list |
//! | `/unregister` | Always refused |
//!
//! ## Example
//!
//! ```rust,ignore
//! use pki_web::{portal, AppState, Settings};
//!
//! let settings = Settings::load("pki.toml".as_ref())?;
//! let app = portal::router(AppState::from_settings(&settings)?);
//! ```

pub mod config;
pub mod error;
pub mod portal;
pub mod server;
pub mod sso;
pub mod views;

pub use config::{Settings, WebConfig};
pub use error::{Result, WebError};
pub use portal::{plan_action, router, AppState, PortalAction};
pub use sso::{SsoClient, SsoClientBuilder, UserInfo};
