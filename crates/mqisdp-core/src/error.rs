//! Error types for the MQIsdp codec.

use thiserror::Error;

/// Wire-level protocol errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown message type: {0}")]
    InvalidPacketType(u8),

    #[error("Invalid remaining length encoding")]
    InvalidRemainingLength,

    #[error("{kind} format error: expected at least {expected} bytes, got {actual}")]
    MalformedFrame {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid QoS: {0}")]
    InvalidQoS(u8),

    #[error("{field} is {len} bytes, a length prefix allows at most 65535")]
    StringTooLong { field: &'static str, len: usize },

    #[error("Packet too large: remaining length {0}")]
    PacketTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
