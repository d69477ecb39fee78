//! Server half of the clock synchronization handshake.
//!
//! Each connection is introduced (name, acknowledgment, RTT probe) on its own
//! task; once every connection has been introduced the server picks one
//! nominal start instant and sends each player that instant offset by its
//! own measured round-trip time.

use log::debug;
use shared::error::HandshakeResult;
use shared::protocol::{
    expect_token, read_name, send_token, write_start_instant, ACK, CONNECTION_ESTABLISHED,
    NAME_REQUEST, PING, PONG,
};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};

/// What the server learns about a player before gameplay.
#[derive(Debug, Clone, PartialEq)]
pub struct Introduction {
    pub name: String,
    pub rtt: Duration,
}

/// Runs the name exchange, the connection acknowledgment and the RTT probe.
pub async fn introduce<S>(stream: &mut S) -> HandshakeResult<Introduction>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    send_token(stream, NAME_REQUEST).await?;
    let name = read_name(stream).await?;
    debug!("Player {:?} announced itself", name);

    send_token(stream, CONNECTION_ESTABLISHED).await?;
    expect_token(stream, "connection acknowledgment", ACK).await?;

    let probe_sent = Instant::now();
    send_token(stream, PING).await?;
    expect_token(stream, "latency probe", PONG).await?;
    let rtt = probe_sent.elapsed();
    debug!("Player {:?} round-trip time {:?}", name, rtt);

    Ok(Introduction { name, rtt })
}

/// The start instant a given connection is told to use.
pub fn compensated_start(nominal: f64, rtt: Duration) -> f64 {
    nominal + rtt.as_secs_f64()
}

/// Sends the start instant and waits for the final acknowledgment.
pub async fn schedule_start<S>(stream: &mut S, start: f64) -> HandshakeResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_start_instant(stream, start).await?;
    expect_token(stream, "start acknowledgment", ACK).await
}
