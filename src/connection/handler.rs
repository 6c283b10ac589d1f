//! Connection Handler Module
//!
//! This module drives one accepted connection from first byte to close.
//! Unlike a long-lived session, a betting connection carries exactly one
//! request and one reply.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Server accepts the connection
//!        │
//!        ▼
//! 2. receive frame ──(framing error / closed)──> log, close, no reply
//!        │
//!        ▼
//! 3. parse request ──(malformed)──> "bets not stored"
//!        │
//!        ▼
//! 4. store bets / answer winners query
//!        │
//!        ▼
//! 5. send reply frame
//!        │
//!        ▼
//! 6. stream dropped (every path)
//! ```
//!
//! Receiving and sending race against the shutdown token, so a signal
//! during a blocked read or write ends the connection right away.

use crate::lottery::Lottery;
use crate::protocol::{codec, ProtocolError, Reply, Request};
use crate::server::ShutdownCoordinator;
use crate::storage::{Bet, BetStore};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Connections currently being served
    pub active_connections: AtomicU64,
    /// Highest value `active_connections` ever reached
    pub peak_active_connections: AtomicU64,
    /// Request frames received
    pub messages_received: AtomicU64,
    /// Total bets handed to the store
    pub bets_stored: AtomicU64,
    /// Reply frames sent
    pub replies_sent: AtomicU64,
    /// Connections that ended without a reply
    pub failed_connections: AtomicU64,
    /// Genuine accept failures (not caused by shutdown)
    pub accept_errors: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        let active = self.active_connections.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_active_connections.fetch_max(active, Ordering::AcqRel);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bets_stored(&self, count: usize) {
        self.bets_stored.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn reply_sent(&self) {
        self.replies_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_failed(&self) {
        self.failed_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accept_failed(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// The collaborators every connection needs.
#[derive(Clone)]
pub struct ConnectionContext {
    pub store: Arc<dyn BetStore>,
    pub lottery: Arc<Lottery>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub stats: Arc<ConnectionStats>,
}

impl ConnectionContext {
    pub fn new(
        store: Arc<dyn BetStore>,
        lottery: Arc<Lottery>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            store,
            lottery,
            shutdown,
            stats: Arc::new(ConnectionStats::new()),
        }
    }
}

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Bets stored and acknowledged
    Stored(usize),
    /// Request rejected with "bets not stored"
    Rejected,
    /// Winners query answered
    Answered,
    /// No reply could be delivered
    Failed,
}

/// Handles a single client connection.
pub struct ConnectionHandler<S> {
    /// The client stream, dropped when the handler finishes
    stream: S,

    /// Client's address (for logging)
    peer: SocketAddr,

    ctx: ConnectionContext,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, ctx: ConnectionContext) -> Self {
        Self { stream, peer, ctx }
    }

    /// Serves the connection's single exchange and closes it.
    pub async fn handle(mut self) -> Outcome {
        self.ctx.stats.connection_opened();
        debug!(peer = %self.peer, "Serving connection");

        let outcome = self.exchange().await;
        if outcome == Outcome::Failed {
            self.ctx.stats.connection_failed();
        }

        self.ctx.stats.connection_closed();
        let Self { stream, peer, .. } = self;
        drop(stream);
        info!(peer = %peer, outcome = ?outcome, "Client connection closed");

        outcome
    }

    /// Receive, parse, persist, reply.
    async fn exchange(&mut self) -> Outcome {
        let received = interruptible(&self.ctx.shutdown, codec::receive(&mut self.stream)).await;
        let payload = match received {
            Ok(payload) => payload,
            Err(e) => {
                self.log_failure("receive", &e);
                return Outcome::Failed;
            }
        };
        self.ctx.stats.message_received();

        let reply = match Request::parse(&payload) {
            Ok(Request::StoreBets(bets)) => self.store(bets),
            Ok(Request::Winners { agency }) => {
                info!(peer = %self.peer, agency, "Winners query received");
                self.ctx.lottery.winners_for(agency)
            }
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Bets rejected");
                Reply::NotStored
            }
        };

        let message = reply.to_string();
        match interruptible(&self.ctx.shutdown, codec::send(&mut self.stream, &message)).await {
            Ok(()) => {
                self.ctx.stats.reply_sent();
                info!(peer = %self.peer, reply = %message, "Reply sent");
            }
            Err(e) => {
                self.log_failure("send", &e);
                return Outcome::Failed;
            }
        }

        match reply {
            Reply::Stored(count) => Outcome::Stored(count),
            Reply::NotStored => Outcome::Rejected,
            Reply::NoWinnersYet | Reply::Winners(_) => Outcome::Answered,
        }
    }

    fn store(&self, bets: Vec<Bet>) -> Reply {
        let count = bets.len();
        match self.ctx.store.store(bets) {
            Ok(()) => {
                self.ctx.stats.bets_stored(count);
                info!(peer = %self.peer, count, "Bets stored");
                Reply::Stored(count)
            }
            Err(e) => {
                error!(peer = %self.peer, count, error = %e, "Failed to store bets");
                Reply::NotStored
            }
        }
    }

    fn log_failure(&self, action: &str, e: &ProtocolError) {
        if !self.ctx.shutdown.is_running() {
            info!(peer = %self.peer, action, "Connection interrupted by shutdown");
        } else if e.is_framing() {
            warn!(peer = %self.peer, action, error = %e, "Malformed frame");
        } else {
            error!(peer = %self.peer, action, error = %e, "Connection error");
        }
    }
}

/// Runs `op` unless shutdown fires first.
async fn interruptible<T, F>(shutdown: &ShutdownCoordinator, op: F) -> Result<T, ProtocolError>
where
    F: Future<Output = Result<T, ProtocolError>>,
{
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(ProtocolError::Interrupted),
        result = op => result,
    }
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, ctx: ConnectionContext) -> Outcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ConnectionHandler::new(stream, peer, ctx).handle().await
}
