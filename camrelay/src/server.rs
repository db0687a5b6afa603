//! Server lifecycle
//!
//! Starts the HTTP server and tears everything down on Ctrl+C or SIGTERM.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use camrelay_api::AppState;
use camrelay_core::Config;

/// How long in-flight requests and the coordinator get to finish.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CamRelayServer {
    config: Config,
    state: AppState,
    coordinator_task: JoinHandle<()>,
}

impl CamRelayServer {
    pub const fn new(config: Config, state: AppState, coordinator_task: JoinHandle<()>) -> Self {
        Self {
            config,
            state,
            coordinator_task,
        }
    }

    /// Start the HTTP server and wait for a shutdown signal
    pub async fn start(self) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut http_handle = self.start_http_server(shutdown_rx).await?;

        let server_stopped = tokio::select! {
            _ = &mut http_handle => {
                error!("HTTP server stopped unexpectedly");
                true
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
                false
            }
        };

        // Signal the HTTP server to stop accepting connections
        let _ = shutdown_tx.send(true);
        if !server_stopped
            && tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut http_handle)
                .await
                .is_err()
        {
            warn!("HTTP server did not drain in time");
            http_handle.abort();
        }

        self.shutdown().await;
        Ok(())
    }

    /// Stop the stream and the coordinator
    async fn shutdown(self) {
        info!("Shutting down camrelay...");
        self.state.coordinator.shutdown().await;
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.coordinator_task).await {
            Ok(Ok(())) => info!("Stream coordinator stopped"),
            Ok(Err(e)) => error!("Stream coordinator task failed: {}", e),
            Err(_) => warn!("Stream coordinator did not stop in time"),
        }
        info!("Shutdown complete");
    }

    /// Bind the listener and spawn the HTTP server with graceful shutdown
    async fn start_http_server(
        &self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> anyhow::Result<JoinHandle<()>> {
        let http_address = self.config.http_address();
        let http_router = camrelay_api::create_router(
            self.state.clone(),
            self.config.server.static_dir.as_deref(),
        );

        let listener = tokio::net::TcpListener::bind(http_address.as_str())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_address}: {e}"))?;
        info!("HTTP server listening on {}", http_address);

        let handle = tokio::spawn(async move {
            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = axum::serve(listener, http_router)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("HTTP server error: {}", e);
            }

            info!("HTTP server shut down gracefully");
        });

        Ok(handle)
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
