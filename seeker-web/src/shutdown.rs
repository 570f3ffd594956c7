//! Graceful shutdown on termination signals.

use crate::health::Health;
use actix_web::dev::ServerHandle;
use std::{future::Future, sync::Arc};

/// Wait for SIGINT or SIGTERM, then shut the server down gracefully.
pub async fn shutdown_on_signal(handle: ServerHandle, health: Arc<Health>) {
    shutdown_on(termination_signal(), handle, health).await;
}

/// Wait for `signal`, then shut the server down gracefully.
///
/// Readiness flips to false first, so load balancers stop sending traffic.
/// The server then stops accepting connections and drains in-flight requests
/// within its shutdown timeout.
pub async fn shutdown_on<F>(signal: F, handle: ServerHandle, health: Arc<Health>)
where
    F: Future<Output = ()>,
{
    signal.await;
    tracing::info!(r#type = "web.shutdown.started", "Shutting down gracefully");
    health.set_ready(false);
    handle.stop(true).await;
    tracing::info!(r#type = "web.shutdown.complete", "Server stopped");
}

/// Resolves on the first SIGINT or SIGTERM.
async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = interrupt() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(error) => {
                tracing::warn!(
                    r#type = "web.shutdown.signal-error",
                    %error,
                    "Could not listen for SIGTERM, only SIGINT will stop the server"
                );
                interrupt().await;
            }
        }
    }

    #[cfg(not(unix))]
    interrupt().await;
}

/// Resolves on SIGINT. Never resolves if SIGINT cannot be listened for.
async fn interrupt() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(
            r#type = "web.shutdown.signal-error",
            %error,
            "Could not listen for SIGINT"
        );
        std::future::pending::<()>().await;
    }
}
