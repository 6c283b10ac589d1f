//! Accept Loop and Server Lifecycle
//!
//! ```text
//! STARTING ──bind ok──> LISTENING ──accept──> SERVING
//!    │                    ▲   │                  │
//!    │ bind error         │   │ shutdown         │ handler returned
//!    ▼                    └───┼──────────────────┘
//!  (fatal)                    ▼
//!                       SHUTTING_DOWN ──listener dropped──> STOPPED
//! ```
//!
//! Connections are served one at a time: the handler is awaited inline,
//! so no new connection is accepted until the previous one is closed.

use crate::config::Config;
use crate::connection::{handle_connection, ConnectionContext, ConnectionStats};
use crate::server::ShutdownCoordinator;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{lookup_host, TcpListener, TcpSocket};
use tracing::{debug, error, info};

/// Pause after a failed accept before trying again
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle states of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Listening,
    Serving,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Starting => "starting",
            ServerState::Listening => "listening",
            ServerState::Serving => "serving",
            ServerState::ShuttingDown => "shutting_down",
            ServerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// The bet server: a listening socket plus the connection collaborators.
pub struct Server {
    /// Dropped (closing the socket) when the server shuts down
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    ctx: ConnectionContext,
    state: ServerState,
}

impl Server {
    /// Binds `address` and starts listening with the given backlog.
    ///
    /// A failure here is an operator error and is not retried.
    pub async fn bind(
        address: &str,
        backlog: u32,
        ctx: ConnectionContext,
    ) -> Result<Self, ServerError> {
        debug!(state = %ServerState::Starting, address, backlog, "Server starting");

        let bind_error = |source: io::Error| ServerError::Bind {
            address: address.to_string(),
            source,
        };

        let addr = lookup_host(address)
            .await
            .map_err(bind_error)?
            .next()
            .ok_or_else(|| {
                bind_error(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "address resolved to nothing",
                ))
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;

        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(backlog).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        info!(address = %local_addr, backlog, "Listening");

        Ok(Self {
            listener: Some(listener),
            local_addr,
            ctx,
            state: ServerState::Listening,
        })
    }

    /// Binds using the resolved configuration.
    pub async fn from_config(config: &Config, ctx: ConnectionContext) -> Result<Self, ServerError> {
        Self::bind(&config.bind_address(), config.listen_backlog, ctx).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.ctx.stats
    }

    fn transition(&mut self, next: ServerState) {
        debug!(from = %self.state, to = %next, "Server state change");
        self.state = next;
    }

    /// Runs the accept loop until shutdown, then closes the listener.
    pub async fn run(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let shutdown = Arc::clone(&self.ctx.shutdown);

        while shutdown.is_running() {
            debug!("Waiting for connections");

            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    info!(peer = %peer, "Connection accepted");
                    shutdown.set_active(peer);
                    self.transition(ServerState::Serving);

                    handle_connection(stream, peer, self.ctx.clone()).await;

                    shutdown.take_active();
                    self.draw_if_ready();
                    if shutdown.is_running() {
                        self.transition(ServerState::Listening);
                    }
                }
                Err(e) if !shutdown.is_running() => {
                    info!(error = %e, "Accept interrupted by shutdown");
                    break;
                }
                Err(e) => {
                    self.ctx.stats.accept_failed();
                    error!(error = %e, "Failed to accept connection");
                    if !back_off(&shutdown).await {
                        break;
                    }
                }
            }
        }

        self.transition(ServerState::ShuttingDown);
        drop(listener);
        info!(address = %self.local_addr, "Listening socket closed");
        self.transition(ServerState::Stopped);
    }

    fn draw_if_ready(&self) {
        if let Err(e) = self.ctx.lottery.try_draw(self.ctx.store.as_ref()) {
            error!(error = %e, "Lottery draw failed");
        }
    }
}

/// Waits before the next accept so errors like EMFILE don't spin the loop.
///
/// Returns false if shutdown began during the wait.
async fn back_off(shutdown: &ShutdownCoordinator) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client;
    use crate::lottery::Lottery;
    use crate::protocol::{parse_bets, Reply};
    use crate::storage::{Bet, BetStore, MemoryBetStore, StoreError, LOTTERY_WINNER_NUMBER};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;

    /// Records any overlapping `store` calls.
    #[derive(Default)]
    struct ReentrancyCheck {
        inner: MemoryBetStore,
        busy: AtomicBool,
        overlaps: AtomicUsize,
    }

    impl BetStore for ReentrancyCheck {
        fn store(&self, bets: Vec<Bet>) -> Result<(), StoreError> {
            if self.busy.swap(true, Ordering::AcqRel) {
                self.overlaps.fetch_add(1, Ordering::Relaxed);
            }
            std::thread::sleep(Duration::from_millis(20));
            let result = self.inner.store(bets);
            self.busy.store(false, Ordering::Release);
            result
        }

        fn load(&self) -> Result<Vec<Bet>, StoreError> {
            self.inner.load()
        }
    }

    fn context(store: Arc<dyn BetStore>, agencies: usize) -> ConnectionContext {
        ConnectionContext::new(
            store,
            Arc::new(Lottery::new(agencies)),
            Arc::new(ShutdownCoordinator::new()),
        )
    }

    async fn start(ctx: ConnectionContext) -> (SocketAddr, JoinHandle<Server>) {
        let mut server = Server::bind("127.0.0.1:0", 16, ctx).await.unwrap();
        assert_eq!(server.state(), ServerState::Listening);
        let addr = server.local_addr();
        let handle = tokio::spawn(async move {
            server.run().await;
            server
        });
        (addr, handle)
    }

    async fn stop(ctx: &ConnectionContext, handle: JoinHandle<Server>) -> Server {
        ctx.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("server did not stop")
            .unwrap()
    }

    fn bets(payload: &str) -> Vec<Bet> {
        parse_bets(payload).unwrap()
    }

    #[tokio::test]
    async fn test_store_and_acknowledge() {
        let store = Arc::new(MemoryBetStore::new());
        let ctx = context(store.clone(), 1);
        let (addr, handle) = start(ctx.clone()).await;

        let reply = client::submit_bets(
            addr,
            &bets("1990-01-01,42,Juan,Perez,1,30904465;2000-12-20,7,Ana,Diaz,1,1234"),
        )
        .await
        .unwrap();
        assert_eq!(reply, Reply::Stored(2));
        assert_eq!(store.len(), 2);

        let server = stop(&ctx, handle).await;
        assert_eq!(server.state(), ServerState::Stopped);
        assert_eq!(server.stats().replies_sent.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_over_tcp() {
        let store = Arc::new(MemoryBetStore::new());
        let ctx = context(store.clone(), 1);
        let (addr, handle) = start(ctx.clone()).await;

        let reply = client::exchange(addr, "a,b,c;d,e,f,g,h,i").await.unwrap();
        assert_eq!(reply, "bets not stored");
        assert!(store.is_empty());

        // The server keeps serving after a rejected request
        let reply = client::exchange(addr, "1990-01-01,42,Juan,Perez,1,30904465")
            .await
            .unwrap();
        assert_eq!(reply, "1 bets stored");

        stop(&ctx, handle).await;
    }

    #[tokio::test]
    async fn test_server_closes_after_one_exchange() {
        let ctx = context(Arc::new(MemoryBetStore::new()), 1);
        let (addr, handle) = start(ctx.clone()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        crate::protocol::send(&mut stream, "1990-01-01,42,Juan,Perez,1,30904465")
            .await
            .unwrap();
        assert_eq!(
            crate::protocol::receive(&mut stream).await.unwrap(),
            "1 bets stored"
        );

        let mut rest = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(1), stream.read_to_end(&mut rest))
            .await
            .expect("server kept the connection open")
            .unwrap();
        assert_eq!(n, 0);

        stop(&ctx, handle).await;
    }

    #[tokio::test]
    async fn test_shutdown_during_blocked_accept() {
        let ctx = context(Arc::new(MemoryBetStore::new()), 1);
        let (addr, handle) = start(ctx.clone()).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let server = stop(&ctx, handle).await;

        assert_eq!(server.state(), ServerState::Stopped);
        assert_eq!(server.stats().accept_errors.load(Ordering::Relaxed), 0);
        assert_eq!(server.stats().connections_accepted.load(Ordering::Relaxed), 0);
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_while_serving() {
        let store = Arc::new(MemoryBetStore::new());
        let ctx = context(store.clone(), 1);
        let (addr, handle) = start(ctx.clone()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"35:1990-01-01").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ctx.shutdown.active().is_some());

        let server = stop(&ctx, handle).await;
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(ctx.shutdown.active().is_none());
        assert_eq!(server.stats().failed_connections.load(Ordering::Relaxed), 1);
        assert!(store.is_empty());

        // The client sees the connection go away without a reply
        let mut rest = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(1), stream.read_to_end(&mut rest))
            .await
            .expect("connection was not closed")
            .unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_connections_are_served_sequentially() {
        let store = Arc::new(ReentrancyCheck::default());
        let ctx = context(store.clone(), 1);
        let (addr, handle) = start(ctx.clone()).await;

        let clients: Vec<_> = (0..6)
            .map(|i| {
                tokio::spawn(async move {
                    let payload = format!("1990-01-01,{},Juan,Perez,1,{}", i, 30904465 + i);
                    client::exchange(addr, &payload).await.unwrap()
                })
            })
            .collect();

        for c in clients {
            assert_eq!(c.await.unwrap(), "1 bets stored");
        }

        let server = stop(&ctx, handle).await;
        assert_eq!(store.overlaps.load(Ordering::Relaxed), 0);
        assert_eq!(store.inner.len(), 6);
        assert_eq!(
            server.stats().peak_active_connections.load(Ordering::Relaxed),
            1
        );
        assert_eq!(server.stats().connections_accepted.load(Ordering::Relaxed), 6);
    }

    #[tokio::test]
    async fn test_winners_after_all_agencies_ask() {
        let store = Arc::new(MemoryBetStore::new());
        let ctx = context(store.clone(), 2);
        let (addr, handle) = start(ctx.clone()).await;

        let payload = format!(
            "1990-01-01,{},Juan,Perez,1,30904465;1990-01-01,1,Ana,Diaz,2,1234",
            LOTTERY_WINNER_NUMBER
        );
        let reply = client::exchange(addr, &payload).await.unwrap();
        assert_eq!(reply, "2 bets stored");

        assert_eq!(
            client::request_winners(addr, 1).await.unwrap(),
            Reply::NoWinnersYet
        );
        assert!(!ctx.lottery.is_drawn());
        assert_eq!(
            client::request_winners(addr, 2).await.unwrap(),
            Reply::NoWinnersYet
        );

        // The draw runs once the second agency's connection is done
        assert_eq!(
            client::request_winners(addr, 1).await.unwrap(),
            Reply::Winners(vec!["30904465".to_string()])
        );
        assert_eq!(
            client::request_winners(addr, 2).await.unwrap(),
            Reply::Winners(vec![])
        );

        stop(&ctx, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_error_backs_off() {
        let shutdown = ShutdownCoordinator::new();

        let started = tokio::time::Instant::now();
        assert!(back_off(&shutdown).await);
        assert!(started.elapsed() >= ACCEPT_BACKOFF);

        shutdown.trigger();
        let started = tokio::time::Instant::now();
        assert!(!back_off(&shutdown).await);
        assert!(started.elapsed() < ACCEPT_BACKOFF);
    }

    #[tokio::test]
    async fn test_bind_error() {
        let ctx = context(Arc::new(MemoryBetStore::new()), 1);
        let first = Server::bind("127.0.0.1:0", 4, ctx.clone()).await.unwrap();
        let taken = first.local_addr().to_string();

        // Binding the same port again must fail; SO_REUSEADDR does not
        // allow two listeners on Linux
        match Server::bind(&taken, 4, ctx).await {
            Err(ServerError::Bind { address, .. }) => assert_eq!(address, taken),
            Ok(_) => panic!("second bind on {} succeeded", taken),
        }
    }
}
