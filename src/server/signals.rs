//! Termination Signals
//!
//! SIGINT and SIGTERM start the graceful shutdown. Nothing else is handled.

use crate::server::ShutdownCoordinator;
use std::io;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Installs the signal handlers and spawns the task that reacts to them.
///
/// Handlers are registered before this returns, so a signal delivered right
/// after the call is never missed.
#[cfg(unix)]
pub fn listen_for_shutdown(shutdown: Arc<ShutdownCoordinator>) -> io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                Some(()) = interrupt.recv() => "SIGINT",
                Some(()) = terminate.recv() => "SIGTERM",
                else => break,
            };

            if shutdown.trigger() {
                info!(signal = name, "Shutdown signal received");
            } else {
                debug!(signal = name, "Shutdown already in progress");
            }
        }
    }))
}

#[cfg(not(unix))]
pub fn listen_for_shutdown(shutdown: Arc<ShutdownCoordinator>) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if shutdown.trigger() {
                info!(signal = "ctrl-c", "Shutdown signal received");
            } else {
                debug!(signal = "ctrl-c", "Shutdown already in progress");
            }
        }
    }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sigterm_triggers_shutdown() {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let _task = listen_for_shutdown(Arc::clone(&shutdown)).unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(2), shutdown.cancelled())
            .await
            .expect("SIGTERM did not trigger shutdown");
        assert!(!shutdown.is_running());
    }
}
