//! Per-connection protocol state machine.
//!
//! Each accepted socket is split into a reader, driven here, and a writer
//! task that drains the session's outbound queue. The session registers in
//! the roster before any frame arrives and is removed exactly once when the
//! reader loop ends, whatever the reason.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::metrics::RelayMetrics;
use crate::protocol::{ClientFrame, Outbound, rejection};
use crate::roster::SessionId;
use crate::state::SharedState;

/// Shared per-server state handed to every session.
pub struct RelayContext {
    pub state: SharedState,
    pub metrics: Arc<RelayMetrics>,
    pub max_line_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated { login: String },
    Closed,
}

/// Why a session ended.
#[derive(Debug)]
pub enum CloseReason {
    PeerClosed,
    LoginRejected { login: String },
    ServerShutdown,
    WriterGone,
    Error(RelayError),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::LoginRejected { login } => write!(f, "login {login:?} rejected"),
            CloseReason::ServerShutdown => write!(f, "server shutdown"),
            CloseReason::WriterGone => write!(f, "write side failed"),
            CloseReason::Error(e) => write!(f, "{e}"),
        }
    }
}

enum Flow {
    Continue,
    Close(CloseReason),
}

struct Session {
    id: SessionId,
    peer: SocketAddr,
    state: SessionState,
    outbound: mpsc::UnboundedSender<Outbound>,
    ctx: Arc<RelayContext>,
}

/// Drive one connection from accept to teardown.
pub async fn run(
    stream: TcpStream,
    peer: SocketAddr,
    id: SessionId,
    ctx: Arc<RelayContext>,
    cancel: CancellationToken,
) {
    let (read_half, write_half) = stream.into_split();
    let mut frames = FramedRead::new(
        read_half,
        LinesCodec::new_with_max_length(ctx.max_line_length),
    );
    let sink = FramedWrite::new(write_half, LinesCodec::new());
    let (tx, rx) = mpsc::unbounded_channel();

    ctx.state.lock().await.roster.register(id, tx.clone());
    ctx.metrics.connection_opened();
    info!(peer = %peer, session = id, "connection established");

    let mut writer = tokio::spawn(write_loop(sink, rx, peer));
    let mut writer_done = false;

    let mut session = Session {
        id,
        peer,
        state: SessionState::Unauthenticated,
        outbound: tx,
        ctx,
    };

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break CloseReason::ServerShutdown,
            _ = &mut writer => {
                writer_done = true;
                break CloseReason::WriterGone;
            }
            frame = frames.next() => match frame {
                Some(Ok(line)) => match session.handle_frame(&line).await {
                    Flow::Continue => {}
                    Flow::Close(reason) => break reason,
                },
                Some(Err(e)) => match RelayError::from(e) {
                    RelayError::TransportDisconnected => break CloseReason::PeerClosed,
                    err => {
                        if matches!(err, RelayError::Decode(_)) {
                            session.ctx.metrics.decode_error();
                        }
                        break CloseReason::Error(err);
                    }
                },
                None => break CloseReason::PeerClosed,
            },
        }
    };

    session.close(&reason).await;
    // Dropping the last sender lets the writer drain its queue and exit.
    drop(session);
    if !writer_done {
        if let Err(e) = writer.await {
            warn!(peer = %peer, session = id, "writer task failed: {}", e);
        }
    }
}

impl Session {
    async fn handle_frame(&mut self, line: &str) -> Flow {
        match self.state {
            SessionState::Unauthenticated => match ClientFrame::parse(line) {
                ClientFrame::Login(candidate) => self.login(candidate).await,
                ClientFrame::Text(_) => {
                    debug!(peer = %self.peer, session = self.id, "ignoring frame before login");
                    Flow::Continue
                }
            },
            // Every frame is a message once authenticated, `login:` lines included.
            SessionState::Authenticated { .. } => {
                self.broadcast(line).await;
                Flow::Continue
            }
            SessionState::Closed => Flow::Close(CloseReason::PeerClosed),
        }
    }

    async fn login(&mut self, candidate: &str) -> Flow {
        let result = self.ctx.state.lock().await.authenticate(self.id, candidate);
        match result {
            Ok(replayed) => {
                self.ctx.metrics.login_accepted();
                if replayed > 0 {
                    self.ctx.metrics.history_replayed();
                }
                info!(
                    peer = %self.peer,
                    session = self.id,
                    login = candidate,
                    replayed,
                    "login accepted"
                );
                self.state = SessionState::Authenticated {
                    login: candidate.to_string(),
                };
                Flow::Continue
            }
            Err(RelayError::LoginConflict { login }) => {
                self.ctx.metrics.login_rejected();
                warn!(peer = %self.peer, session = self.id, login = %login, "login occupied");
                let _ = self.outbound.send(Outbound::Line(rejection(&login)));
                let _ = self.outbound.send(Outbound::Close);
                Flow::Close(CloseReason::LoginRejected { login })
            }
            Err(e) => Flow::Close(CloseReason::Error(e)),
        }
    }

    async fn broadcast(&self, body: &str) {
        let delivered = self.ctx.state.lock().await.broadcast(self.id, body);
        match delivered {
            Some(n) => {
                self.ctx.metrics.message_broadcast(n);
                debug!(session = self.id, recipients = n, "message broadcast");
            }
            None => warn!(session = self.id, "broadcast from session missing in roster"),
        }
    }

    /// Leave the roster and enter `Closed`. Only the first call has effect.
    async fn close(&mut self, reason: &CloseReason) {
        let login = match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Closed => return,
            SessionState::Unauthenticated => None,
            SessionState::Authenticated { login } => Some(login),
        };

        if self.ctx.state.lock().await.roster.remove(self.id).is_some() {
            self.ctx.metrics.connection_closed();
        }
        info!(
            peer = %self.peer,
            session = self.id,
            login = login.as_deref().unwrap_or("-"),
            reason = %reason,
            "connection closed"
        );
    }
}

/// Drain the outbound queue into the socket until it closes or a `Close`
/// item arrives. Either way the write half is flushed and shut down.
async fn write_loop(
    mut sink: FramedWrite<OwnedWriteHalf, LinesCodec>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    peer: SocketAddr,
) {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Line(line) => {
                if let Err(e) = sink.send(line).await {
                    debug!(peer = %peer, "write failed: {}", e);
                    return;
                }
            }
            Outbound::Close => break,
        }
    }
    if let Err(e) = SinkExt::<String>::close(&mut sink).await {
        debug!(peer = %peer, "shutdown of write half failed: {}", e);
    }
}
