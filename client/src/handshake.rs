//! Client half of the clock synchronization handshake.

use crate::error::ClientResult;
use log::{debug, info};
use shared::error::HandshakeResult;
use shared::protocol::{
    expect_token, read_start_instant, send_token, validate_name, write_name, ACK,
    CONNECTION_ESTABLISHED, NAME_REQUEST, PING, PONG,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Answers the server's handshake and returns the start instant it assigned,
/// in seconds since the Unix epoch.
pub async fn join<S>(stream: &mut S, name: &str) -> HandshakeResult<f64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    validate_name(name)?;

    expect_token(stream, "name request", NAME_REQUEST).await?;
    write_name(stream, name).await?;

    expect_token(stream, "connection established", CONNECTION_ESTABLISHED).await?;
    send_token(stream, ACK).await?;

    expect_token(stream, "latency probe", PING).await?;
    send_token(stream, PONG).await?;

    let start = read_start_instant(stream).await?;
    send_token(stream, ACK).await?;
    debug!("Server scheduled start at {:.3}", start);

    Ok(start)
}

/// Connects to `address` and completes the handshake as `name`.
pub async fn connect(address: &str, name: &str) -> ClientResult<(TcpStream, f64)> {
    let mut stream = TcpStream::connect(address).await?;
    stream.set_nodelay(true)?;
    info!("Connected to {}, waiting for the other player", address);

    let start = join(&mut stream, name).await?;
    Ok((stream, start))
}
