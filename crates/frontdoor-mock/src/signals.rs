//! Shutdown signal handling for a foreground mock server.
//!
//! SIGTERM and SIGINT (Ctrl+C on other platforms) flip a watch channel that
//! [`crate::MockServer::run_until_shutdown`] waits on.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Listens for termination signals and fans them out to waiters.
///
/// Clones share the same shutdown state.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Spawns the task that waits for SIGTERM or SIGINT.
    #[cfg(unix)]
    pub fn spawn_listener(&self) {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(term), Ok(int)) => (term, int),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!(error = %e, "Failed to install signal handlers");
                        return;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down"),
            }
            shutdown_tx.send_replace(true);
            debug!("Signal listener stopped");
        });
    }

    /// Spawns the task that waits for Ctrl+C.
    #[cfg(not(unix))]
    pub fn spawn_listener(&self) {
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, shutting down");
                    shutdown_tx.send_replace(true);
                }
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C"),
            }
        });
    }

    /// Future that resolves once shutdown is requested.
    pub fn shutdown(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.shutdown_tx.subscribe(),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Requests shutdown without a signal.
    pub fn trigger_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Resolves once shutdown has been requested.
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub async fn wait(mut self) {
        // A dropped sender also ends the wait.
        let _ = self.rx.wait_for(|requested| *requested).await;
    }
}
