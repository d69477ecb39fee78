use std::path::PathBuf;
use thiserror::Error;

/// Failures on the framed gameplay channel.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error on channel: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message {0:?}: expected `name, note_id, judgment`")]
    MalformedMessage(String),
    #[error("invalid judgment label {0:?}")]
    InvalidJudgmentLabel(String),
    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(u32),
    #[error("frame payload is not valid utf-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Failures while synchronizing a connection before gameplay.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("i/o error during handshake: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer closed the connection during handshake")]
    Closed,
    #[error("unexpected token at {step}: expected {expected:?}, received {received:?}")]
    UnexpectedToken {
        step: &'static str,
        expected: String,
        received: String,
    },
    #[error("invalid player name: {0}")]
    InvalidName(String),
}

impl HandshakeError {
    pub(crate) fn unexpected(step: &'static str, expected: &[u8], received: &[u8]) -> Self {
        HandshakeError::UnexpectedToken {
            step,
            expected: String::from_utf8_lossy(expected).into_owned(),
            received: String::from_utf8_lossy(received).into_owned(),
        }
    }
}

/// Failures while loading a chart or its assets.
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("cannot read chart {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse chart: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid chart: {0}")]
    Invalid(String),
    #[error("audio asset {0} not found")]
    MissingAudio(PathBuf),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
pub type HandshakeResult<T> = Result<T, HandshakeError>;
pub type ChartResult<T> = Result<T, ChartError>;
