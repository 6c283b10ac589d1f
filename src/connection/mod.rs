//! Connection Handler Module
//!
//! This module serves individual client connections. The server hands each
//! accepted stream to a [`ConnectionHandler`] and waits for it to finish
//! before accepting the next one: connections never overlap.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Server accept loop                      │
//! │                     (server module)                         │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept() then await
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read frame  │───>│ Parse bets  │───>│ Store bets  │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send reply  │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use betrelay::connection::{handle_connection, ConnectionContext};
//!
//! let (stream, peer) = listener.accept().await?;
//! let outcome = handle_connection(stream, peer, ctx.clone()).await;
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{
    handle_connection, ConnectionContext, ConnectionHandler, ConnectionStats, Outcome,
};
