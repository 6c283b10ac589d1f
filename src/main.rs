//! betrelay - A Lottery Bet Submission Server
//!
//! This is the main entry point for the betrelay server.
//! It loads the configuration, sets up logging and signal handling, and
//! runs the accept loop until a termination signal arrives.

use betrelay::config::Config;
use betrelay::connection::ConnectionContext;
use betrelay::lottery::Lottery;
use betrelay::server::{signals, Server, ShutdownCoordinator};
use betrelay::storage::FileBetStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    println!(
        r#"
betrelay v{} - Lottery Bet Submission Server
──────────────────────────────────────────────────────────────
Listening on {} (backlog {})
Storing bets in {}

Send SIGINT or SIGTERM to shutdown gracefully.
"#,
        betrelay::VERSION,
        config.bind_address(),
        config.listen_backlog,
        config.storage_path.display()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args, environment and the optional TOML file
    let config = Config::load()?;

    // Set up logging; RUST_LOG overrides the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    debug!(?config, "Configuration loaded");

    // Signal handlers go in before the socket is bound
    let shutdown = Arc::new(ShutdownCoordinator::new());
    let _signals = signals::listen_for_shutdown(Arc::clone(&shutdown))?;

    let store = Arc::new(FileBetStore::new(config.storage_path.clone()));
    let lottery = Arc::new(Lottery::new(config.number_of_agencies));
    let ctx = ConnectionContext::new(store, lottery, shutdown);

    let mut server = Server::from_config(&config, ctx).await?;
    print_banner(&config);

    server.run().await;

    let stats = server.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        bets = stats.bets_stored.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}
