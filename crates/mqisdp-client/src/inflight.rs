//! In-flight acknowledgement tracking.
//!
//! Every operation the broker must acknowledge (QoS 1/2 PUBLISH, SUBSCRIBE,
//! UNSUBSCRIBE) gets an entry keyed by its message id, whether or not the
//! caller supplied a completion callback. The entry reserves the id until the
//! terminal acknowledgement arrives:
//! - QoS 1: PUBACK
//! - QoS 2: PUBREC (entry moves to awaiting PUBCOMP), then PUBCOMP
//! - SUBSCRIBE: SUBACK
//! - UNSUBSCRIBE: UNSUBACK
//!
//! Acknowledgements for unknown ids, or for an entry of a different kind,
//! are ignored.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;

use crate::events::{Callback, Completion};

/// Outbound QoS 2 progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos2Stage {
    AwaitingPubrec,
    AwaitingPubcomp,
}

/// What an in-flight message id is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingKind {
    PublishQos1,
    PublishQos2(Qos2Stage),
    Subscribe { topic: Bytes },
    Unsubscribe { topic: Bytes },
}

struct PendingOperation {
    kind: PendingKind,
    callback: Option<Callback>,
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("kind", &self.kind)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Pending operations of one connection.
#[derive(Debug, Default)]
pub struct InflightTable {
    pending: HashMap<u16, PendingOperation>,
}

impl InflightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `message_id` until its terminal acknowledgement.
    pub fn register(&mut self, message_id: u16, kind: PendingKind, callback: Option<Callback>) {
        debug_assert!(!self.pending.contains_key(&message_id));
        self.pending
            .insert(message_id, PendingOperation { kind, callback });
    }

    pub fn contains(&self, message_id: u16) -> bool {
        self.pending.contains_key(&message_id)
    }

    pub fn kind(&self, message_id: u16) -> Option<&PendingKind> {
        self.pending.get(&message_id).map(|op| &op.kind)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop every entry without running callbacks.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// PUBACK. Returns true if it completed a QoS 1 publish.
    pub fn on_puback(&mut self, message_id: u16) -> bool {
        if !matches!(self.kind(message_id), Some(PendingKind::PublishQos1)) {
            self.ignore("PUBACK", message_id);
            return false;
        }
        self.finish(message_id, Completion::Published { message_id })
    }

    /// PUBREC. Returns true if a QoS 2 publish moved to awaiting PUBCOMP.
    pub fn on_pubrec(&mut self, message_id: u16) -> bool {
        if let Some(PendingOperation {
            kind: PendingKind::PublishQos2(stage),
            ..
        }) = self.pending.get_mut(&message_id)
        {
            *stage = Qos2Stage::AwaitingPubcomp;
            return true;
        }
        self.ignore("PUBREC", message_id);
        false
    }

    /// PUBCOMP. Returns true if it completed a QoS 2 publish.
    pub fn on_pubcomp(&mut self, message_id: u16) -> bool {
        if !matches!(self.kind(message_id), Some(PendingKind::PublishQos2(_))) {
            self.ignore("PUBCOMP", message_id);
            return false;
        }
        self.finish(message_id, Completion::Published { message_id })
    }

    /// SUBACK carrying the granted QoS.
    pub fn on_suback(&mut self, message_id: u16, granted_qos: u8) -> bool {
        let topic = match self.kind(message_id) {
            Some(PendingKind::Subscribe { topic }) => topic.clone(),
            _ => {
                self.ignore("SUBACK", message_id);
                return false;
            }
        };
        self.finish(
            message_id,
            Completion::Subscribed {
                message_id,
                topic,
                granted_qos,
            },
        )
    }

    /// UNSUBACK.
    pub fn on_unsuback(&mut self, message_id: u16) -> bool {
        let topic = match self.kind(message_id) {
            Some(PendingKind::Unsubscribe { topic }) => topic.clone(),
            _ => {
                self.ignore("UNSUBACK", message_id);
                return false;
            }
        };
        self.finish(message_id, Completion::Unsubscribed { message_id, topic })
    }

    fn finish(&mut self, message_id: u16, completion: Completion) -> bool {
        let Some(op) = self.pending.remove(&message_id) else {
            return false;
        };
        if let Some(callback) = op.callback {
            callback(completion);
        }
        true
    }

    fn ignore(&self, kind: &str, message_id: u16) {
        log::debug!(
            "ignoring {} for message id {} (pending: {:?})",
            kind,
            message_id,
            self.kind(message_id)
        );
    }
}
