//! Client error types.

use std::io;

use mqisdp_core::{ConnackCode, PacketType, ProtocolError};
use thiserror::Error;

/// Client error type.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{0}")]
    ConnectionRefused(ConnackCode),

    #[error("Unknown error: #{0}")]
    UnknownConnackCode(u8),

    #[error("Please connect to server first")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("All message ids in use")]
    MessageIdsExhausted,

    #[error("Unexpected {0} from server")]
    UnexpectedPacket(PacketType),
}

pub type Result<T> = std::result::Result<T, ClientError>;
