//! Client Helpers
//!
//! One connection per request, matching the server's single-shot protocol.

use crate::protocol::{codec, ProtocolError, Reply, Request};
use crate::storage::Bet;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// Sends `payload` as one frame and returns the reply payload.
pub async fn exchange<A>(addr: A, payload: &str) -> Result<String, ProtocolError>
where
    A: ToSocketAddrs,
{
    let mut stream = TcpStream::connect(addr).await?;
    codec::send(&mut stream, payload).await?;
    let reply = codec::receive(&mut stream).await?;
    debug!(reply = %reply, "Reply received");
    Ok(reply)
}

/// Submits a batch of bets.
pub async fn submit_bets<A>(addr: A, bets: &[Bet]) -> Result<Reply, ProtocolError>
where
    A: ToSocketAddrs,
{
    let payload = Request::StoreBets(bets.to_vec()).encode();
    exchange(addr, &payload).await.map(|reply| Reply::parse(&reply))
}

/// Asks for the winners of `agency`.
pub async fn request_winners<A>(addr: A, agency: u32) -> Result<Reply, ProtocolError>
where
    A: ToSocketAddrs,
{
    let payload = Request::Winners { agency }.encode();
    exchange(addr, &payload).await.map(|reply| Reply::parse(&reply))
}
