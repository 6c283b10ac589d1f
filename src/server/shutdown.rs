//! Shutdown Coordination
//!
//! The accept loop and the signal listener share one [`ShutdownCoordinator`]:
//!
//! ```text
//!  signal task                     accept loop / connection handler
//!  ───────────                     ────────────────────────────────
//!  trigger()                       select! { accept() | cancelled() }
//!    running: true -> false        select! { receive() | cancelled() }
//!    active slot   -> None         select! { send()    | cancelled() }
//!    watch: false  -> true   ───>  woken, drops its socket
//! ```
//!
//! `trigger()` never performs I/O. Closing happens where the socket is
//! owned: the blocked future is dropped and its socket goes with it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::info;

/// Shared shutdown state: the `running` flag, the cancellation token and
/// the slot recording the connection currently being served.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    running: AtomicBool,
    cancel_tx: watch::Sender<bool>,
    active: Mutex<Option<SocketAddr>>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            running: AtomicBool::new(true),
            cancel_tx,
            active: Mutex::new(None),
        }
    }

    /// Returns false once shutdown has begun.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts the shutdown. Returns true only for the call that flipped the
    /// flag; later calls are no-ops.
    pub fn trigger(&self) -> bool {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        info!("Graceful shutdown in progress");

        if let Some(peer) = self.take_active() {
            info!(peer = %peer, "Closing active client connection");
        }

        self.cancel_tx.send_replace(true);
        true
    }

    /// Completes once shutdown has been triggered.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    fn slot(&self) -> MutexGuard<'_, Option<SocketAddr>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records `peer` as the connection being served.
    pub fn set_active(&self, peer: SocketAddr) {
        *self.slot() = Some(peer);
    }

    /// Clears the active slot, returning what it held.
    pub fn take_active(&self) -> Option<SocketAddr> {
        self.slot().take()
    }

    /// The connection currently being served, if any.
    pub fn active(&self) -> Option<SocketAddr> {
        *self.slot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn peer() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn test_starts_running() {
        let shutdown = ShutdownCoordinator::new();
        assert!(shutdown.is_running());
        assert!(shutdown.active().is_none());
    }

    #[test]
    fn test_trigger_is_idempotent() {
        let shutdown = ShutdownCoordinator::new();
        assert!(shutdown.trigger());
        assert!(!shutdown.is_running());
        assert!(!shutdown.trigger());
        assert!(!shutdown.is_running());
    }

    #[test]
    fn test_trigger_clears_active_connection() {
        let shutdown = ShutdownCoordinator::new();
        shutdown.set_active(peer());
        assert_eq!(shutdown.active(), Some(peer()));

        shutdown.trigger();
        assert!(shutdown.active().is_none());
    }

    #[test]
    fn test_active_slot_survives_poisoned_lock() {
        let shutdown = Arc::new(ShutdownCoordinator::new());

        let poisoner = Arc::clone(&shutdown);
        let result = std::thread::spawn(move || {
            let _guard = poisoner.active.lock().unwrap();
            panic!("poison the slot");
        })
        .join();
        assert!(result.is_err());
        assert!(shutdown.active.is_poisoned());

        shutdown.set_active(peer());
        assert_eq!(shutdown.active(), Some(peer()));
        assert_eq!(shutdown.take_active(), Some(peer()));
        assert!(shutdown.active().is_none());

        shutdown.set_active(peer());
        assert!(shutdown.trigger());
        assert!(shutdown.active().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let shutdown = Arc::new(ShutdownCoordinator::new());

        let waiter = {
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move { shutdown.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter was not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_after_trigger_returns_immediately() {
        let shutdown = ShutdownCoordinator::new();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_millis(100), shutdown.cancelled())
            .await
            .expect("cancelled() blocked after trigger");
    }
}
