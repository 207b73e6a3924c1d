//! TCP listener and connection accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::metrics::RelayMetrics;
use crate::roster::SessionId;
use crate::session::{self, RelayContext};
use crate::state::{ChatState, SharedState};

/// Pause after a failed `accept()` so descriptor exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Owns the listener plus the roster and history every session shares.
pub struct Server {
    listener: TcpListener,
    ctx: Arc<RelayContext>,
    shutdown_grace: Duration,
}

impl Server {
    /// Bind the configured listen address. Failure here aborts startup.
    pub async fn bind(config: &RelayConfig) -> Result<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;

        let ctx = Arc::new(RelayContext {
            state: ChatState::shared(config.history_capacity),
            metrics: Arc::new(RelayMetrics::new()),
            max_line_length: config.max_line_length,
        });

        Ok(Self {
            listener,
            ctx,
            shutdown_grace: config.shutdown_grace,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> SharedState {
        self.ctx.state.clone()
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        self.ctx.metrics.clone()
    }

    /// Accept connections until `cancel` fires, then close every session
    /// and wait (up to the shutdown grace period) for them to finish.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let Server {
            listener,
            ctx,
            shutdown_grace,
        } = self;

        let tracker = TaskTracker::new();
        let mut next_id: SessionId = 0;

        if let Ok(addr) = listener.local_addr() {
            info!("chat relay listening on {}", addr);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("accept loop cancelled");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("failed to accept incoming connection: {}", e);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(peer = %peer, "failed to set TCP_NODELAY: {}", e);
                    }

                    next_id += 1;
                    tracker.spawn(session::run(
                        stream,
                        peer,
                        next_id,
                        ctx.clone(),
                        cancel.child_token(),
                    ));
                }
            }
        }

        drop(listener);
        tracker.close();
        let open = tracker.len();
        if open > 0 {
            info!(sessions = open, "waiting for sessions to close");
        }
        if tokio::time::timeout(shutdown_grace, tracker.wait())
            .await
            .is_err()
        {
            warn!(
                sessions = tracker.len(),
                "sessions still open after shutdown grace period"
            );
        }

        match serde_json::to_string(&ctx.metrics.snapshot()) {
            Ok(json) => info!(metrics = %json, "chat relay stopped"),
            Err(_) => info!("chat relay stopped"),
        }
        Ok(())
    }
}
