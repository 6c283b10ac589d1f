//! # betrelay - A Lottery Bet Submission Server
//!
//! betrelay accepts lottery bets from agencies over TCP. Each connection
//! carries a single framed request (a batch of bets or a winners query)
//! and a single framed reply, after which the server closes it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              betrelay                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│ Bet Record  │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Parser     │                  │
//! │  └──────┬──────┘    └──────┬──────┘    └─────────────┘                  │
//! │         │                  │                                            │
//! │         │                  ▼                                            │
//! │         │           ┌─────────────┐    ┌─────────────┐                  │
//! │         │           │  Framing    │    │  BetStore   │                  │
//! │         │           │  Codec      │    │ (JSON lines)│                  │
//! │         │           └─────────────┘    └─────────────┘                  │
//! │         ▼                                                               │
//! │  ┌─────────────────────────────────┐                                    │
//! │  │ ShutdownCoordinator             │<── SIGINT / SIGTERM                │
//! │  │ running flag + cancel token     │                                    │
//! │  └─────────────────────────────────┘                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Protocol
//!
//! ```text
//! request : "<L>:" birth_date,bet_number,first_name,last_name,agency,document_id[;...]
//! reply   : "<L>:" "<n> bets stored" | "bets not stored"
//! ```
//!
//! `L` is the decimal byte length of the payload that follows the colon.
//!
//! ## Quick Start
//!
//! ```ignore
//! use betrelay::connection::ConnectionContext;
//! use betrelay::lottery::Lottery;
//! use betrelay::server::{Server, ShutdownCoordinator};
//! use betrelay::storage::FileBetStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let shutdown = Arc::new(ShutdownCoordinator::new());
//!     let ctx = ConnectionContext::new(
//!         Arc::new(FileBetStore::new("./bets.jsonl")),
//!         Arc::new(Lottery::new(5)),
//!         shutdown,
//!     );
//!
//!     let mut server = Server::bind("0.0.0.0:12345", 5, ctx).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: framing codec, bet record parser, request/reply payloads
//! - [`storage`]: the `Bet` record and bet stores
//! - [`connection`]: the per-connection handler
//! - [`server`]: accept loop, lifecycle state machine, graceful shutdown
//! - [`lottery`]: the winners draw
//! - [`config`]: CLI, environment and TOML configuration
//! - [`client`]: helpers for talking to a server

pub mod client;
pub mod config;
pub mod connection;
pub mod lottery;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::Config;
pub use connection::{handle_connection, ConnectionContext, ConnectionStats};
pub use protocol::{ProtocolError, RecordError, Reply, Request};
pub use server::{Server, ServerError, ShutdownCoordinator};
pub use storage::{Bet, BetStore, FileBetStore, MemoryBetStore};

/// The default port betrelay listens on
pub const DEFAULT_PORT: u16 = 12345;

/// Version of betrelay
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
