//! Client events and state types.

use bytes::Bytes;
use mqisdp_core::QoS;

use crate::error::ClientError;

/// Completion callback for operations the broker acknowledges.
pub type Callback = Box<dyn FnOnce(Completion) + Send + 'static>;

/// Callback for connect, pong and close notifications.
pub type Notify = Box<dyn FnOnce() + Send + 'static>;

/// Events produced by the connection, in the order they happened.
#[derive(Debug)]
pub enum Event {
    /// CONNACK accepted.
    Connected,
    /// Something went wrong. The connection may still be usable.
    Error(ClientError),
    /// Transport closed.
    Disconnected,
    /// Received a publish message.
    Publish {
        topic: Bytes,
        payload: Bytes,
        /// Packet id for QoS 1/2, `None` for QoS 0.
        message_id: Option<u16>,
        qos: QoS,
        retain: bool,
        dup: bool,
    },
    /// No PINGRESP within one keep-alive interval.
    Timeout,
    /// PINGRESP received.
    Ping,
}

/// Result handed to a completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// PUBACK (QoS 1) or PUBCOMP (QoS 2).
    Published { message_id: u16 },
    /// SUBACK with the QoS the broker granted.
    Subscribed {
        message_id: u16,
        topic: Bytes,
        granted_qos: u8,
    },
    /// UNSUBACK.
    Unsubscribed { message_id: u16, topic: Bytes },
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport not connected yet, or the broker refused CONNECT.
    Disconnected,
    /// CONNECT sent.
    AwaitingConnack,
    Connected,
    /// Transport closed. Terminal.
    Closed,
}
