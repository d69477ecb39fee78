//! Wire format shared by client and server.
//!
//! The handshake exchanges fixed literal tokens on the raw stream. After it,
//! every message is a frame: a 4-byte big-endian length followed by that many
//! bytes of UTF-8 payload of the form `name, note_id, judgment_label`.

use crate::error::{HandshakeError, HandshakeResult, ProtocolError, ProtocolResult};
use crate::judgment::Judgment;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const NAME_REQUEST: &[u8] = b"Retrieving client name...";
pub const CONNECTION_ESTABLISHED: &[u8] = b"Connection Established";
pub const ACK: &[u8] = b"ACK";
pub const PING: &[u8] = b"ping!";
pub const PONG: &[u8] = b"pong!";

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_FRAME_LEN: u32 = 4096;

const FIELD_SEPARATOR: &str = ", ";

/// A judgment event as it travels in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgmentMessage {
    pub name: String,
    pub note_id: usize,
    pub judgment: Judgment,
}

impl JudgmentMessage {
    pub fn new(name: impl Into<String>, note_id: usize, judgment: Judgment) -> Self {
        Self {
            name: name.into(),
            note_id,
            judgment,
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.name,
            self.note_id,
            self.judgment.label(),
            sep = FIELD_SEPARATOR
        )
    }

    /// Parses a frame payload. A wrong field count or a non-numeric id is a
    /// malformed message; an unknown label is reported separately.
    pub fn parse(payload: &str) -> ProtocolResult<Self> {
        let fields: Vec<&str> = payload.split(FIELD_SEPARATOR).collect();
        let [name, note_id, label] = fields.as_slice() else {
            return Err(ProtocolError::MalformedMessage(payload.to_string()));
        };
        let note_id = note_id
            .trim()
            .parse::<usize>()
            .map_err(|_| ProtocolError::MalformedMessage(payload.to_string()))?;
        let judgment = label.trim().parse::<Judgment>()?;

        Ok(Self {
            name: name.trim().to_string(),
            note_id,
            judgment,
        })
    }
}

/// Fills `buf` completely. Returns `Ok(false)` if the peer closed first.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = reader.read(&mut buf[filled..]).await?;
        if read == 0 {
            return Ok(false);
        }
        filled += read;
    }
    Ok(true)
}

/// Reads one frame. `Ok(None)` means the peer closed the connection.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> ProtocolResult<Option<String>> {
    let mut length = [0u8; 4];
    if !read_full(reader, &mut length).await? {
        return Ok(None);
    }

    let length = u32::from_be_bytes(length);
    if length > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let mut payload = vec![0u8; length as usize];
    if !read_full(reader, &mut payload).await? {
        return Ok(None);
    }

    Ok(Some(String::from_utf8(payload)?))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &str) -> ProtocolResult<()> {
    let length = u32::try_from(payload.len())
        .ok()
        .filter(|length| *length <= MAX_FRAME_LEN)
        .ok_or(ProtocolError::FrameTooLarge(payload.len().min(u32::MAX as usize) as u32))?;

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(payload.as_bytes());
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_exact_or_closed<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> HandshakeResult<()> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(HandshakeError::Closed),
        Err(e) => Err(HandshakeError::Io(e)),
    }
}

/// Reads exactly `expected.len()` bytes and checks they match the literal token.
pub async fn expect_token<R: AsyncRead + Unpin>(
    reader: &mut R,
    step: &'static str,
    expected: &[u8],
) -> HandshakeResult<()> {
    let mut received = vec![0u8; expected.len()];
    read_exact_or_closed(reader, &mut received).await?;
    if received != expected {
        return Err(HandshakeError::unexpected(step, expected, &received));
    }
    Ok(())
}

pub async fn send_token<W: AsyncWrite + Unpin>(writer: &mut W, token: &[u8]) -> HandshakeResult<()> {
    writer.write_all(token).await?;
    writer.flush().await?;
    Ok(())
}

pub fn validate_name(name: &str) -> HandshakeResult<()> {
    if name.is_empty() {
        return Err(HandshakeError::InvalidName("name is empty".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(HandshakeError::InvalidName(format!(
            "name is longer than {} bytes",
            MAX_NAME_LEN
        )));
    }
    if name.contains(',') {
        return Err(HandshakeError::InvalidName(format!("{:?} contains a comma", name)));
    }
    Ok(())
}

pub async fn write_name<W: AsyncWrite + Unpin>(writer: &mut W, name: &str) -> HandshakeResult<()> {
    validate_name(name)?;
    let mut message = Vec::with_capacity(4 + name.len());
    message.extend_from_slice(&(name.len() as u32).to_be_bytes());
    message.extend_from_slice(name.as_bytes());
    send_token(writer, &message).await
}

pub async fn read_name<R: AsyncRead + Unpin>(reader: &mut R) -> HandshakeResult<String> {
    let mut length = [0u8; 4];
    read_exact_or_closed(reader, &mut length).await?;
    let length = u32::from_be_bytes(length) as usize;
    if length > MAX_NAME_LEN {
        return Err(HandshakeError::InvalidName(format!(
            "announced length {} exceeds {}",
            length, MAX_NAME_LEN
        )));
    }

    let mut raw = vec![0u8; length];
    read_exact_or_closed(reader, &mut raw).await?;
    let name = String::from_utf8(raw)
        .map_err(|_| HandshakeError::InvalidName("name is not valid utf-8".to_string()))?
        .trim()
        .to_string();
    validate_name(&name)?;
    Ok(name)
}

/// Sends a start instant as seconds since the Unix epoch in big-endian f64.
pub async fn write_start_instant<W: AsyncWrite + Unpin>(writer: &mut W, seconds: f64) -> HandshakeResult<()> {
    send_token(writer, &seconds.to_be_bytes()).await
}

pub async fn read_start_instant<R: AsyncRead + Unpin>(reader: &mut R) -> HandshakeResult<f64> {
    let mut raw = [0u8; 8];
    read_exact_or_closed(reader, &mut raw).await?;
    Ok(f64::from_be_bytes(raw))
}
