//! Connection state machine.
//!
//! [`Connection`] performs no I/O. The driver feeds it transport input and
//! the current time, then drains what it produced:
//!
//! ```ignore
//! let mut conn = Connection::new(options)?;
//! conn.connect(None)?;                     // once the socket is up
//! socket.write_all(&conn.take_outgoing())?;
//!
//! conn.handle_incoming(&buf[..n], Instant::now());
//! conn.handle_timeout(Instant::now());     // at conn.next_timeout()
//! while let Some(event) = conn.next_event() { /* ... */ }
//! ```
//!
//! States run `Disconnected -> AwaitingConnack -> Connected -> Closed`.
//! A refused CONNACK falls back to `Disconnected`; `Closed` is terminal.

use std::collections::VecDeque;
use std::io;
use std::time::Instant;

use bytes::Bytes;
use mqisdp_core::{
    check_string, decode_publish, encode_ack, encode_connect, encode_disconnect, encode_pingreq,
    encode_pingresp, encode_publish, encode_subscribe, encode_unsubscribe, ConnackCode, Connect,
    Frame, PacketType, ProtocolError, Publish, QoS, Reassembler,
};

use crate::config::{ConnectOptions, PublishOptions, Will};
use crate::error::{ClientError, Result};
use crate::events::{Callback, ConnectionState, Event, Notify};
use crate::inflight::{InflightTable, PendingKind, Qos2Stage};
use crate::packet_id::MessageIdCounter;

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Protocol engine for a single connection.
pub struct Connection {
    options: ConnectOptions,
    state: ConnectionState,
    /// DISCONNECT queued, waiting for the transport to close.
    closing: bool,
    reassembler: Reassembler,
    frames: Vec<Frame>,
    ids: MessageIdCounter,
    inflight: InflightTable,
    write_buf: Vec<u8>,
    events: VecDeque<Event>,
    next_ping: Option<Instant>,
    pong_deadline: Option<Instant>,
    on_connected: Vec<Notify>,
    on_pong: Vec<Notify>,
    on_closed: Vec<Notify>,
}

impl Connection {
    /// Create an engine for `options`. Fails if the options break the
    /// client-side limits.
    pub fn new(options: ConnectOptions) -> Result<Self> {
        options.validate()?;

        Ok(Self {
            options,
            state: ConnectionState::Disconnected,
            closing: false,
            reassembler: Reassembler::new(),
            frames: Vec::new(),
            ids: MessageIdCounter::new(),
            inflight: InflightTable::new(),
            write_buf: Vec::with_capacity(DEFAULT_BUFFER_SIZE),
            events: VecDeque::new(),
            next_ping: None,
            pong_deadline: None,
            on_connected: Vec::new(),
            on_pong: Vec::new(),
            on_closed: Vec::new(),
        })
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True once CONNACK accepted the session and DISCONNECT has not been sent.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && !self.closing
    }

    /// Operations still waiting for an acknowledgement.
    pub fn pending_count(&self) -> usize {
        self.inflight.pending_count()
    }

    /// Queue CONNECT. Call once the transport is connected.
    pub fn connect(&mut self, on_connected: Option<Notify>) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            return Err(ClientError::InvalidState(format!(
                "cannot connect while {:?}",
                self.state
            )));
        }

        let connect = Connect {
            client_id: &self.options.client_id,
            keep_alive: self.options.keep_alive,
            clean_session: self.options.clean_session,
            will: self.options.will.as_ref().map(Will::as_last_will),
            username: self.options.username.as_deref(),
            password: self.options.password.as_deref(),
        };
        encode_connect(&connect, &mut self.write_buf);

        self.on_connected.extend(on_connected);
        self.state = ConnectionState::AwaitingConnack;
        log::debug!("CONNECT queued for {}", self.options.client_id);
        Ok(())
    }

    /// Queue a PUBLISH.
    ///
    /// Returns the message id for QoS 1 and 2. The callback runs on PUBACK
    /// (QoS 1) or PUBCOMP (QoS 2). A QoS 0 publish is never acknowledged, so
    /// its callback is dropped.
    pub fn publish(
        &mut self,
        topic: impl Into<Bytes>,
        payload: impl Into<Bytes>,
        options: PublishOptions,
        callback: Option<Callback>,
    ) -> Result<Option<u16>> {
        if !self.is_connected() {
            return self.not_connected();
        }

        let mut publish = Publish {
            dup: options.dup,
            qos: options.qos,
            retain: options.retain,
            topic: topic.into(),
            message_id: None,
            payload: payload.into(),
        };
        if let Err(e) = publish.validate() {
            return self.reject(e);
        }

        publish.message_id = match options.qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce => Some(self.track(PendingKind::PublishQos1, callback)?),
            QoS::ExactlyOnce => Some(self.track(
                PendingKind::PublishQos2(Qos2Stage::AwaitingPubrec),
                callback,
            )?),
        };
        encode_publish(&publish, &mut self.write_buf);
        Ok(publish.message_id)
    }

    /// Queue a SUBSCRIBE for one topic filter. The callback receives the
    /// granted QoS.
    pub fn subscribe(
        &mut self,
        topic: impl Into<Bytes>,
        qos: QoS,
        callback: Option<Callback>,
    ) -> Result<u16> {
        if !self.is_connected() {
            return self.not_connected();
        }

        let topic = topic.into();
        if let Err(e) = check_string("topic", &topic) {
            return self.reject(e);
        }
        let message_id = self.track(
            PendingKind::Subscribe {
                topic: topic.clone(),
            },
            callback,
        )?;
        encode_subscribe(message_id, &topic, qos, &mut self.write_buf);
        Ok(message_id)
    }

    /// Queue an UNSUBSCRIBE for one topic filter.
    pub fn unsubscribe(&mut self, topic: impl Into<Bytes>, callback: Option<Callback>) -> Result<u16> {
        if !self.is_connected() {
            return self.not_connected();
        }

        let topic = topic.into();
        if let Err(e) = check_string("topic", &topic) {
            return self.reject(e);
        }
        let message_id = self.track(
            PendingKind::Unsubscribe {
                topic: topic.clone(),
            },
            callback,
        )?;
        encode_unsubscribe(message_id, &topic, &mut self.write_buf);
        Ok(message_id)
    }

    /// Queue a PINGREQ and arm the keep-alive deadline.
    pub fn ping(&mut self, now: Instant, on_pong: Option<Notify>) -> Result<()> {
        if !self.is_connected() {
            return self.not_connected();
        }
        self.on_pong.extend(on_pong);
        self.send_ping(now);
        Ok(())
    }

    /// Queue DISCONNECT and stop the keep-alive cycle.
    ///
    /// The transport stays open; `on_closed` runs once it closes. DISCONNECT
    /// is only sent while a session is being established or is up. Once
    /// closed this does nothing.
    pub fn disconnect(&mut self, on_closed: Option<Notify>) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.on_closed.extend(on_closed);
        if self.closing
            || !matches!(
                self.state,
                ConnectionState::AwaitingConnack | ConnectionState::Connected
            )
        {
            return;
        }

        encode_disconnect(&mut self.write_buf);
        self.closing = true;
        self.next_ping = None;
        self.pong_deadline = None;
        self.on_pong.clear();
        log::debug!("DISCONNECT queued");
    }

    /// Feed bytes read from the transport.
    pub fn handle_incoming(&mut self, chunk: &[u8], now: Instant) {
        if self.state == ConnectionState::Closed {
            return;
        }

        let mut frames = std::mem::take(&mut self.frames);
        let result = self.reassembler.feed(chunk, &mut frames);
        for frame in frames.drain(..) {
            self.dispatch(&frame, now);
        }
        self.frames = frames;

        if let Err(e) = result {
            self.emit_error(e.into());
        }
    }

    /// Fire whichever keep-alive timer is due.
    pub fn handle_timeout(&mut self, now: Instant) {
        if self.pong_deadline.is_some_and(|deadline| now >= deadline) {
            log::warn!(
                "no PINGRESP within {}s keep-alive",
                self.options.keep_alive
            );
            self.pong_deadline = None;
            self.next_ping = None;
            self.on_pong.clear();
            self.events.push_back(Event::Timeout);
        }

        if self.next_ping.is_some_and(|at| now >= at) {
            self.send_ping(now);
        }
    }

    /// Earliest instant at which [`handle_timeout`](Self::handle_timeout)
    /// has work to do.
    pub fn next_timeout(&self) -> Option<Instant> {
        match (self.next_ping, self.pong_deadline) {
            (Some(ping), Some(pong)) => Some(ping.min(pong)),
            (ping, pong) => ping.or(pong),
        }
    }

    /// The transport ended or was closed.
    ///
    /// In-flight operations are discarded without running their callbacks.
    pub fn handle_close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        log::info!(
            "connection closed with {} operations in flight",
            self.inflight.pending_count()
        );
        self.state = ConnectionState::Closed;
        self.closing = false;
        self.inflight.clear();
        self.reassembler.reset();
        self.write_buf.clear();
        self.next_ping = None;
        self.pong_deadline = None;
        self.on_connected.clear();
        self.on_pong.clear();

        self.events.push_back(Event::Disconnected);
        for callback in self.on_closed.drain(..) {
            callback();
        }
    }

    /// The transport failed. Reports the error, then behaves as a close.
    pub fn handle_transport_error(&mut self, err: io::Error) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.emit_error(err.into());
        self.handle_close();
    }

    /// Drain bytes waiting to be written.
    pub fn take_outgoing(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.write_buf)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.write_buf.is_empty()
    }

    /// Pop the next event.
    pub fn next_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    fn dispatch(&mut self, frame: &Frame, now: Instant) {
        let result = match frame.packet_type() {
            Ok(packet_type) => self.handle_packet(packet_type, frame, now),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            self.emit_error(e);
        }
    }

    fn handle_packet(&mut self, packet_type: PacketType, frame: &Frame, now: Instant) -> Result<()> {
        match packet_type {
            PacketType::Connack => self.on_connack(frame, now),
            PacketType::Publish => self.on_publish(frame),
            PacketType::Puback => {
                let id = ack_id(frame, packet_type, 4)?;
                self.inflight.on_puback(id);
                Ok(())
            }
            PacketType::Pubrec => {
                let id = ack_id(frame, packet_type, 4)?;
                encode_ack(PacketType::Pubrel, id, &mut self.write_buf);
                self.inflight.on_pubrec(id);
                Ok(())
            }
            PacketType::Pubrel => {
                // Inbound QoS 2 ids are not tracked. Every PUBREL gets a
                // PUBCOMP echoing its id, known or not, and a redelivered
                // PUBLISH is delivered again.
                let id = ack_id(frame, packet_type, 4)?;
                encode_ack(PacketType::Pubcomp, id, &mut self.write_buf);
                Ok(())
            }
            PacketType::Pubcomp => {
                let id = ack_id(frame, packet_type, 4)?;
                self.inflight.on_pubcomp(id);
                Ok(())
            }
            PacketType::Suback => {
                let id = ack_id(frame, packet_type, 5)?;
                let Some(&granted_qos) = frame.body().get(2) else {
                    return Err(ProtocolError::MalformedFrame {
                        kind: packet_type.name(),
                        expected: frame.header().header_len + 3,
                        actual: frame.len(),
                    }
                    .into());
                };
                self.inflight.on_suback(id, granted_qos);
                Ok(())
            }
            PacketType::Unsuback => {
                let id = ack_id(frame, packet_type, 4)?;
                self.inflight.on_unsuback(id);
                Ok(())
            }
            PacketType::Pingreq => {
                encode_pingresp(&mut self.write_buf);
                Ok(())
            }
            PacketType::Pingresp => {
                self.on_pingresp(now);
                Ok(())
            }
            PacketType::Connect
            | PacketType::Subscribe
            | PacketType::Unsubscribe
            | PacketType::Disconnect => Err(ClientError::UnexpectedPacket(packet_type)),
        }
    }

    fn on_connack(&mut self, frame: &Frame, now: Instant) -> Result<()> {
        frame.ensure_len(PacketType::Connack.name(), 4)?;
        if self.state != ConnectionState::AwaitingConnack {
            return Err(ClientError::UnexpectedPacket(PacketType::Connack));
        }

        let code = frame.body()[1];
        match ConnackCode::from_u8(code) {
            Some(ConnackCode::Accepted) if self.closing => {
                // DISCONNECT already queued: no keep-alive, no notification.
                log::debug!("CONNACK after DISCONNECT, waiting for close");
                self.state = ConnectionState::Connected;
                self.ids.reset();
                self.on_connected.clear();
                Ok(())
            }
            Some(ConnackCode::Accepted) => {
                log::info!("connected as {}", self.options.client_id);
                self.state = ConnectionState::Connected;
                self.ids.reset();
                self.next_ping = Some(now + self.options.ping_interval());
                self.events.push_back(Event::Connected);
                for callback in self.on_connected.drain(..) {
                    callback();
                }
                Ok(())
            }
            Some(refused) => {
                self.state = ConnectionState::Disconnected;
                self.on_connected.clear();
                Err(ClientError::ConnectionRefused(refused))
            }
            None => {
                self.state = ConnectionState::Disconnected;
                self.on_connected.clear();
                Err(ClientError::UnknownConnackCode(code))
            }
        }
    }

    fn on_publish(&mut self, frame: &Frame) -> Result<()> {
        let Publish {
            dup,
            qos,
            retain,
            topic,
            message_id,
            payload,
        } = decode_publish(frame.header(), frame.bytes())?;

        self.events.push_back(Event::Publish {
            topic,
            payload,
            message_id,
            qos,
            retain,
            dup,
        });

        match (qos, message_id) {
            (QoS::AtLeastOnce, Some(id)) => encode_ack(PacketType::Puback, id, &mut self.write_buf),
            (QoS::ExactlyOnce, Some(id)) => encode_ack(PacketType::Pubrec, id, &mut self.write_buf),
            _ => {}
        }
        Ok(())
    }

    fn on_pingresp(&mut self, now: Instant) {
        self.pong_deadline = None;
        if self.is_connected() {
            self.next_ping = Some(now + self.options.ping_interval());
        }
        self.events.push_back(Event::Ping);
        for callback in self.on_pong.drain(..) {
            callback();
        }
    }

    fn send_ping(&mut self, now: Instant) {
        encode_pingreq(&mut self.write_buf);
        self.next_ping = None;
        // An earlier unanswered ping keeps its deadline.
        let deadline = now + self.options.keep_alive_interval();
        self.pong_deadline.get_or_insert(deadline);
    }

    /// Allocate a message id and register it in the in-flight table.
    fn track(&mut self, kind: PendingKind, callback: Option<Callback>) -> Result<u16> {
        let inflight = &self.inflight;
        let message_id = self
            .ids
            .next(|id| inflight.contains(id))
            .ok_or(ClientError::MessageIdsExhausted)?;
        self.inflight.register(message_id, kind, callback);
        Ok(message_id)
    }

    fn not_connected<T>(&mut self) -> Result<T> {
        self.emit_error(ClientError::NotConnected);
        Err(ClientError::NotConnected)
    }

    /// Report an operation that cannot be encoded. Nothing is queued.
    fn reject<T>(&mut self, err: ProtocolError) -> Result<T> {
        self.emit_error(err.clone().into());
        Err(err.into())
    }

    fn emit_error(&mut self, err: ClientError) {
        log::warn!("{}", err);
        self.events.push_back(Event::Error(err));
    }
}

/// Message id of an acknowledgement frame at least `min` bytes long.
fn ack_id(frame: &Frame, packet_type: PacketType, min: usize) -> Result<u16> {
    frame.ensure_len(packet_type.name(), min)?;
    frame.message_id().ok_or_else(|| {
        ProtocolError::MalformedFrame {
            kind: packet_type.name(),
            expected: min,
            actual: frame.len(),
        }
        .into()
    })
}
