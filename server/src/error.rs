use shared::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no player completed the handshake")]
    NoPlayers,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("note {0} does not exist in the chart")]
    UnknownNote(usize),
}

pub type ServerResult<T> = Result<T, ServerError>;
