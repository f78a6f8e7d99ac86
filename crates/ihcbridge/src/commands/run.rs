//! `run`: attach the broker, bridge the controller, wait for a signal.

use tracing::info;

use ihcbridge_core::Gateway;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let settings = super::load_settings(global)?;
    let mut gateway = Gateway::new(settings.bridge);

    gateway.connect_broker(&settings.broker).await?;

    if let Err(e) = gateway.connect_controller(settings.controller).await {
        // Release the broker before reporting; the setup error wins.
        if let Err(close_err) = gateway.close().await {
            tracing::warn!(error = %close_err, "broker did not stop cleanly");
        }
        return Err(e.into());
    }

    let bindings = gateway.table().map_or(0, |t| t.len());
    info!(bindings, "bridge running");

    shutdown_signal().await;
    info!("shutting down");

    gateway.close().await?;
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
