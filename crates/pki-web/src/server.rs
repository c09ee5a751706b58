//! HTTP server runner.

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Settings;
use crate::portal::{self, AppState};
use crate::Result;

/// Serve the portal until Ctrl-C.
pub async fn run(settings: &Settings) -> Result<()> {
    let state = AppState::from_settings(settings)?;
    if !state.authority.layout().is_initialized() {
        warn!(
            storage = %settings.pki.storage_path.display(),
            "storage is not initialized; issuance will fail until `pki init` runs"
        );
    }

    let listener = TcpListener::bind(settings.web.listen).await?;
    info!(
        addr = %settings.web.listen,
        crl_route = %settings.web.crl_route,
        debug = settings.web.debug,
        "portal listening"
    );

    axum::serve(listener, portal::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("portal stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
