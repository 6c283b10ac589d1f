//! Server Lifecycle Module
//!
//! This module owns the listening socket, runs the sequential accept loop
//! and coordinates graceful shutdown.
//!
//! ## Modules
//!
//! - `listener`: binding, the accept/serve loop and the state machine
//! - `shutdown`: the shared `running` flag and cancellation token
//! - `signals`: SIGINT/SIGTERM wiring
//!
//! ## Example
//!
//! ```ignore
//! use betrelay::server::{signals, Server, ShutdownCoordinator};
//!
//! let shutdown = Arc::new(ShutdownCoordinator::new());
//! let _signals = signals::listen_for_shutdown(Arc::clone(&shutdown))?;
//! let mut server = Server::bind("0.0.0.0:12345", 5, ctx).await?;
//! server.run().await;
//! ```

pub mod listener;
pub mod shutdown;
pub mod signals;

// Re-export commonly used types
pub use listener::{Server, ServerError, ServerState};
pub use shutdown::ShutdownCoordinator;
