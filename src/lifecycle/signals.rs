//! OS signal handling.
//!
//! Ctrl+C (SIGINT) stops the server; a second Ctrl+C is left to the default handler.

use crate::lifecycle::Shutdown;

/// Wait for Ctrl+C, then trigger `shutdown`.
pub async fn stop_on_ctrl_c(shutdown: Shutdown) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => tracing::info!("Shutdown signal received"),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                    return;
                }
            }
            shutdown.trigger();
        }
        _ = shutdown.triggered() => {}
    }
}
