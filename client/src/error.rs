use shared::{ChartError, HandshakeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not reach server: {0}")]
    Io(#[from] std::io::Error),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Chart(#[from] ChartError),
}

pub type ClientResult<T> = Result<T, ClientError>;
