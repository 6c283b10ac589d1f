//! Wire Protocol Implementation
//!
//! This module implements the betting protocol spoken over a single TCP
//! stream: one framed request, one framed reply, then the server closes.
//!
//! ## Modules
//!
//! - `codec`: `<length>:<payload>` framing with short read/write handling
//! - `parser`: bet record parsing (`;` between records, `,` between fields)
//! - `message`: request and reply payloads
//!
//! ## Example
//!
//! ```ignore
//! use betrelay::protocol::{codec, Reply, Request};
//!
//! let payload = codec::receive(&mut stream).await?;
//! let request = Request::parse(&payload)?;
//! codec::send(&mut stream, &Reply::Stored(1).to_string()).await?;
//! ```

pub mod codec;
pub mod message;
pub mod parser;

// Re-export commonly used types for convenience
pub use codec::{encode_frame, receive, send, ProtocolError, MAX_FRAME_SIZE};
pub use message::{Reply, Request};
pub use parser::{encode_bets, parse_bets, RecordError};
