//! Readiness check run before opening a connection to a remote device.

use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};

/// Result of a single probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The listener accepts connections.
    Ready,
    /// The host answered but the listener is not up yet.
    NotReady,
    /// The probe could not reach the host at all; the check is skipped.
    Skipped,
}

/// Host and port being probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
}

impl ProbeTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Boxed future returned by a probe.
pub type ProbeFuture = Pin<Box<dyn Future<Output = ProbeOutcome> + Send>>;

/// Pluggable readiness probe.
pub type ReadinessProbe = Arc<dyn Fn(ProbeTarget) -> ProbeFuture + Send + Sync>;

/// Probe that tries a plain TCP connect to the target.
///
/// A refused connection means the host is up without the listener. Any
/// other failure (resolution, unreachable network, connect timeout) means
/// the probe cannot tell, so the check is skipped.
pub fn tcp_probe(connect_timeout: Duration) -> ReadinessProbe {
    Arc::new(move |target: ProbeTarget| -> ProbeFuture {
        Box::pin(async move {
            let address = (target.host.as_str(), target.port);
            match tokio::time::timeout(connect_timeout, TcpStream::connect(address)).await {
                Ok(Ok(_)) => ProbeOutcome::Ready,
                Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => ProbeOutcome::NotReady,
                Ok(Err(e)) => {
                    debug!(host = %target.host, error = %e, "readiness probe could not connect");
                    ProbeOutcome::Skipped
                }
                Err(_) => ProbeOutcome::Skipped,
            }
        })
    })
}

/// Runs `probe` until it reports ready or skipped, or `bound` elapses.
pub async fn await_ready(
    probe: &ReadinessProbe,
    target: ProbeTarget,
    bound: Duration,
    interval: Duration,
) -> ClientResult<()> {
    let deadline = tokio::time::Instant::now() + bound;

    loop {
        match probe(target.clone()).await {
            ProbeOutcome::Ready => {
                debug!(host = %target.host, port = target.port, "listener is ready");
                return Ok(());
            }
            ProbeOutcome::Skipped => {
                info!(host = %target.host, "readiness probe unavailable, skipping check");
                return Ok(());
            }
            ProbeOutcome::NotReady => {}
        }

        if tokio::time::Instant::now() + interval > deadline {
            warn!(host = %target.host, port = target.port, ?bound, "listener never became ready");
            return Err(ClientError::ServiceUnavailable {
                host: target.host,
                port: target.port,
            });
        }
        tokio::time::sleep(interval).await;
    }
}
