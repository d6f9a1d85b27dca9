//! MQTT v3.1 (MQIsdp) packet types and codec.
//!
//! Every frame starts with a fixed header: one byte carrying the message type
//! and flags, then the remaining length as a base-128 variable byte integer
//! (one to four bytes). Encoders append to a caller-owned `Vec<u8>`.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Protocol name sent in CONNECT.
pub const PROTOCOL_NAME: &[u8] = b"MQIsdp";

/// Protocol level sent in CONNECT.
pub const PROTOCOL_VERSION: u8 = 3;

/// Largest value a four-byte remaining length can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Longest string a two-byte length prefix can describe.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// MQTT Control Packet Types (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::Connack),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::Puback),
            5 => Ok(PacketType::Pubrec),
            6 => Ok(PacketType::Pubrel),
            7 => Ok(PacketType::Pubcomp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::Suback),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::Unsuback),
            12 => Ok(PacketType::Pingreq),
            13 => Ok(PacketType::Pingresp),
            14 => Ok(PacketType::Disconnect),
            _ => Err(ProtocolError::InvalidPacketType(value)),
        }
    }
}

impl PacketType {
    /// Upper-case wire name, used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            PacketType::Connect => "CONNECT",
            PacketType::Connack => "CONNACK",
            PacketType::Publish => "PUBLISH",
            PacketType::Puback => "PUBACK",
            PacketType::Pubrec => "PUBREC",
            PacketType::Pubrel => "PUBREL",
            PacketType::Pubcomp => "PUBCOMP",
            PacketType::Subscribe => "SUBSCRIBE",
            PacketType::Suback => "SUBACK",
            PacketType::Unsubscribe => "UNSUBSCRIBE",
            PacketType::Unsuback => "UNSUBACK",
            PacketType::Pingreq => "PINGREQ",
            PacketType::Pingresp => "PINGRESP",
            PacketType::Disconnect => "DISCONNECT",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Quality of Service levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
#[allow(clippy::enum_variant_names)] // protocol names
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(ProtocolError::InvalidQoS(value)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> u8 {
        qos as u8
    }
}

/// CONNACK return codes (MQTT 3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnackCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUsernamePassword = 4,
    NotAuthorized = 5,
}

impl ConnackCode {
    /// Map a raw return code. Codes above 5 are not defined by the protocol.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(ConnackCode::Accepted),
            1 => Some(ConnackCode::UnacceptableProtocolVersion),
            2 => Some(ConnackCode::IdentifierRejected),
            3 => Some(ConnackCode::ServerUnavailable),
            4 => Some(ConnackCode::BadUsernamePassword),
            5 => Some(ConnackCode::NotAuthorized),
            _ => None,
        }
    }

    /// Human-readable reason reported to the application.
    pub fn reason(self) -> &'static str {
        match self {
            ConnackCode::Accepted => "Connection Accepted",
            ConnackCode::UnacceptableProtocolVersion => {
                "Connection Refused: unacceptable protocol version"
            }
            ConnackCode::IdentifierRejected => "Connection Refused: identifier rejected",
            ConnackCode::ServerUnavailable => "Connection Refused: server unavailable",
            ConnackCode::BadUsernamePassword => "Connection Refused: bad user name or password",
            ConnackCode::NotAuthorized => "Connection Refused: not authorized",
        }
    }
}

impl fmt::Display for ConnackCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Decoded fixed header.
///
/// `message_type` and `qos` are kept raw: the dispatcher decides what an
/// unknown type or an out-of-range QoS means for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub message_type: u8,
    pub dup: bool,
    pub qos: u8,
    pub retain: bool,
    pub remaining_length: usize,
    /// Byte count of the fixed header itself (2 to 5).
    pub header_len: usize,
}

impl FixedHeader {
    /// Total frame length: fixed header plus remaining length.
    pub fn frame_len(&self) -> usize {
        self.header_len + self.remaining_length
    }

    pub fn packet_type(&self) -> Result<PacketType> {
        PacketType::try_from(self.message_type)
    }
}

/// Last will carried in CONNECT.
#[derive(Debug, Clone, Copy)]
pub struct LastWill<'a> {
    pub topic: &'a str,
    pub message: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
}

/// CONNECT packet data.
#[derive(Debug, Clone, Copy)]
pub struct Connect<'a> {
    pub client_id: &'a str,
    pub keep_alive: u16,
    pub clean_session: bool,
    pub will: Option<LastWill<'a>>,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
}

/// PUBLISH packet data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: Bytes,
    /// Present only for QoS 1 and 2.
    pub message_id: Option<u16>,
    pub payload: Bytes,
}

impl Publish {
    /// Remaining length of the encoded frame. QoS 1 and 2 reserve the
    /// message id whether or not it is assigned yet.
    pub fn remaining_length(&self) -> usize {
        let id_len = if self.qos == QoS::AtMostOnce { 0 } else { 2 };
        2 + self.topic.len() + id_len + self.payload.len()
    }

    /// Check the topic fits its length prefix and the frame fits the
    /// remaining length field.
    pub fn validate(&self) -> Result<()> {
        check_string("topic", &self.topic)?;
        check_remaining_length(self.remaining_length())
    }
}

/// Fail if `bytes` cannot be written with a two-byte length prefix.
pub fn check_string(field: &'static str, bytes: &[u8]) -> Result<()> {
    if bytes.len() > MAX_STRING_LEN {
        return Err(ProtocolError::StringTooLong {
            field,
            len: bytes.len(),
        });
    }
    Ok(())
}

/// Fail if `len` does not fit a four-byte remaining length.
pub fn check_remaining_length(len: usize) -> Result<()> {
    if len > MAX_REMAINING_LENGTH {
        return Err(ProtocolError::PacketTooLarge(len));
    }
    Ok(())
}

/// Encode a fixed header into a fresh buffer.
pub fn encode_fixed_header(
    packet_type: PacketType,
    dup: bool,
    qos: QoS,
    retain: bool,
    remaining_length: usize,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    write_fixed_header(packet_type, dup, qos, retain, remaining_length, &mut buf);
    buf
}

fn write_fixed_header(
    packet_type: PacketType,
    dup: bool,
    qos: QoS,
    retain: bool,
    remaining_length: usize,
    buf: &mut Vec<u8>,
) {
    let mut byte = ((packet_type as u8) << 4) | ((qos as u8) << 1);
    if dup {
        byte |= 0x08;
    }
    if retain {
        byte |= 0x01;
    }
    buf.push(byte);
    encode_remaining_length(remaining_length, buf);
}

/// Append the remaining length as a variable byte integer. Returns bytes written.
pub fn encode_remaining_length(mut len: usize, buf: &mut Vec<u8>) -> usize {
    debug_assert!(len <= MAX_REMAINING_LENGTH, "remaining length {} too large", len);
    let start = buf.len();
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if len == 0 {
            break;
        }
    }
    buf.len() - start
}

/// Decode the remaining length field (variable length encoding).
/// Returns (length, bytes_consumed) or None if incomplete.
pub fn decode_remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>> {
    let mut multiplier = 1usize;
    let mut value = 0usize;

    for (i, &byte) in buf.iter().enumerate() {
        if multiplier > 128 * 128 * 128 {
            return Err(ProtocolError::InvalidRemainingLength);
        }

        value += ((byte & 0x7F) as usize) * multiplier;

        if (byte & 0x80) == 0 {
            return Ok(Some((value, i + 1)));
        }

        multiplier *= 128;
    }

    // Need more bytes
    Ok(None)
}

/// Decode a fixed header from the start of `buf`.
///
/// Returns `Ok(None)` when the buffer does not yet hold the whole header.
/// The frame body is not required to be present.
pub fn decode_fixed_header(buf: &[u8]) -> Result<Option<FixedHeader>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };

    let Some((remaining_length, len_bytes)) = decode_remaining_length(&buf[1..])? else {
        return Ok(None);
    };

    Ok(Some(FixedHeader {
        message_type: first >> 4,
        dup: (first & 0x08) != 0,
        qos: (first >> 1) & 0x03,
        retain: (first & 0x01) != 0,
        remaining_length,
        header_len: 1 + len_bytes,
    }))
}

/// Concatenate byte sequences in order.
pub fn concat(parts: &[&[u8]]) -> Vec<u8> {
    parts.concat()
}

/// Callers check lengths with [`check_string`] first.
fn put_string(bytes: &[u8], buf: &mut Vec<u8>) {
    debug_assert!(bytes.len() <= MAX_STRING_LEN);
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Encode a CONNECT packet.
pub fn encode_connect(connect: &Connect<'_>, buf: &mut Vec<u8>) {
    let mut payload = Vec::new();

    put_string(PROTOCOL_NAME, &mut payload);
    payload.push(PROTOCOL_VERSION);

    let mut flags = 0u8;
    if connect.username.is_some() {
        flags |= 0x80;
    }
    if connect.password.is_some() {
        flags |= 0x40;
    }
    if let Some(will) = &connect.will {
        flags |= 0x04 | ((will.qos as u8) << 3);
        if will.retain {
            flags |= 0x20;
        }
    }
    if connect.clean_session {
        flags |= 0x02;
    }
    payload.push(flags);

    payload.extend_from_slice(&connect.keep_alive.to_be_bytes());

    put_string(connect.client_id.as_bytes(), &mut payload);
    if let Some(will) = &connect.will {
        put_string(will.topic.as_bytes(), &mut payload);
        put_string(will.message, &mut payload);
    }
    if let Some(username) = connect.username {
        put_string(username.as_bytes(), &mut payload);
    }
    if let Some(password) = connect.password {
        put_string(password.as_bytes(), &mut payload);
    }

    write_fixed_header(
        PacketType::Connect,
        false,
        QoS::AtMostOnce,
        false,
        payload.len(),
        buf,
    );
    buf.extend_from_slice(&payload);
}

/// Encode a PUBLISH packet.
pub fn encode_publish(publish: &Publish, buf: &mut Vec<u8>) {
    let id_len = if publish.message_id.is_some() { 2 } else { 0 };
    let remaining = 2 + publish.topic.len() + id_len + publish.payload.len();

    write_fixed_header(
        PacketType::Publish,
        publish.dup,
        publish.qos,
        publish.retain,
        remaining,
        buf,
    );
    put_string(&publish.topic, buf);
    if let Some(id) = publish.message_id {
        buf.extend_from_slice(&id.to_be_bytes());
    }
    buf.extend_from_slice(&publish.payload);
}

/// Decode the body of an inbound PUBLISH frame.
///
/// `frame` is the complete frame including its fixed header. Topic and
/// payload are zero-copy slices of it.
pub fn decode_publish(header: &FixedHeader, frame: &Bytes) -> Result<Publish> {
    let qos = QoS::try_from(header.qos)?;
    let body = frame.slice(header.header_len..header.frame_len().min(frame.len()));

    let id_len = if qos == QoS::AtMostOnce { 0 } else { 2 };
    let truncated = |expected: usize| ProtocolError::MalformedFrame {
        kind: "PUBLISH",
        expected: header.header_len + expected,
        actual: frame.len(),
    };

    if body.len() < 2 {
        return Err(truncated(2 + id_len));
    }
    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
    let topic_end = 2 + topic_len;
    if body.len() < topic_end + id_len {
        return Err(truncated(topic_end + id_len));
    }

    let message_id = if id_len > 0 {
        Some(u16::from_be_bytes([body[topic_end], body[topic_end + 1]]))
    } else {
        None
    };

    Ok(Publish {
        dup: header.dup,
        qos,
        retain: header.retain,
        topic: body.slice(2..topic_end),
        message_id,
        payload: body.slice(topic_end + id_len..),
    })
}

/// Encode a two-byte acknowledgement (PUBACK, PUBREC, PUBREL, PUBCOMP).
///
/// PUBREL carries QoS 1 in its fixed header flags.
pub fn encode_ack(packet_type: PacketType, message_id: u16, buf: &mut Vec<u8>) {
    let qos = if packet_type == PacketType::Pubrel {
        QoS::AtLeastOnce
    } else {
        QoS::AtMostOnce
    };
    write_fixed_header(packet_type, false, qos, false, 2, buf);
    buf.extend_from_slice(&message_id.to_be_bytes());
}

/// Encode a SUBSCRIBE packet for a single topic filter.
pub fn encode_subscribe(message_id: u16, topic: &[u8], requested_qos: QoS, buf: &mut Vec<u8>) {
    // Fixed header flags must be 0x02
    write_fixed_header(
        PacketType::Subscribe,
        false,
        QoS::AtLeastOnce,
        false,
        2 + 2 + topic.len() + 1,
        buf,
    );
    buf.extend_from_slice(&message_id.to_be_bytes());
    put_string(topic, buf);
    buf.push(requested_qos as u8);
}

/// Encode an UNSUBSCRIBE packet for a single topic filter.
pub fn encode_unsubscribe(message_id: u16, topic: &[u8], buf: &mut Vec<u8>) {
    write_fixed_header(
        PacketType::Unsubscribe,
        false,
        QoS::AtLeastOnce,
        false,
        2 + 2 + topic.len(),
        buf,
    );
    buf.extend_from_slice(&message_id.to_be_bytes());
    put_string(topic, buf);
}

/// Encode a PINGREQ packet.
pub fn encode_pingreq(buf: &mut Vec<u8>) {
    buf.push((PacketType::Pingreq as u8) << 4);
    buf.push(0);
}

/// Encode a PINGRESP packet.
pub fn encode_pingresp(buf: &mut Vec<u8>) {
    buf.push((PacketType::Pingresp as u8) << 4);
    buf.push(0);
}

/// Encode a DISCONNECT packet.
pub fn encode_disconnect(buf: &mut Vec<u8>) {
    buf.push((PacketType::Disconnect as u8) << 4);
    buf.push(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_header_byte() {
        assert_eq!(
            encode_fixed_header(PacketType::Publish, false, QoS::AtMostOnce, false, 0),
            vec![0x30, 0x00]
        );
        assert_eq!(
            encode_fixed_header(PacketType::Publish, true, QoS::ExactlyOnce, true, 10),
            vec![0x3D, 0x0A]
        );
        assert_eq!(
            encode_fixed_header(PacketType::Subscribe, false, QoS::AtLeastOnce, false, 5)[0],
            0x82
        );
    }

    #[test]
    fn test_remaining_length_boundaries() {
        let cases: [(usize, &[u8]); 6] = [
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (16383, &[0xFF, 0x7F]),
            (16384, &[0x80, 0x80, 0x01]),
            (2_097_151, &[0xFF, 0xFF, 0x7F]),
        ];
        for (value, expected) in cases {
            let header = encode_fixed_header(PacketType::Puback, false, QoS::AtMostOnce, false, value);
            assert_eq!(&header[1..], expected, "value {}", value);
        }
    }

    #[test]
    fn test_fixed_header_roundtrip_all_lengths() {
        let mut buf = Vec::with_capacity(5);
        for value in 0..=2_097_151usize {
            buf.clear();
            write_fixed_header(PacketType::Publish, false, QoS::AtLeastOnce, true, value, &mut buf);
            let header = decode_fixed_header(&buf).unwrap().unwrap();
            assert_eq!(header.remaining_length, value);
            assert_eq!(header.header_len, buf.len());
            assert_eq!(header.message_type, 3);
            assert_eq!(header.qos, 1);
            assert!(header.retain);
            assert!(!header.dup);
        }
    }

    #[test]
    fn test_decode_four_byte_length() {
        let header = decode_fixed_header(&[0x30, 0xFF, 0xFF, 0xFF, 0x7F])
            .unwrap()
            .unwrap();
        assert_eq!(header.remaining_length, MAX_REMAINING_LENGTH);
        assert_eq!(header.header_len, 5);
    }

    #[test]
    fn test_decode_incomplete() {
        assert_eq!(decode_fixed_header(&[]).unwrap(), None);
        assert_eq!(decode_fixed_header(&[0x30]).unwrap(), None);
        assert_eq!(decode_fixed_header(&[0x30, 0x80]).unwrap(), None);
        assert_eq!(decode_fixed_header(&[0x30, 0x80, 0x80, 0x80]).unwrap(), None);
    }

    #[test]
    fn test_decode_too_many_length_bytes() {
        assert_eq!(
            decode_fixed_header(&[0x30, 0x80, 0x80, 0x80, 0x80, 0x01]),
            Err(ProtocolError::InvalidRemainingLength)
        );
    }

    #[test]
    fn test_concat() {
        assert_eq!(concat(&[b"ab", b"", b"c"]), b"abc".to_vec());
        assert!(concat(&[]).is_empty());
    }

    #[test]
    fn test_packet_type_range() {
        assert_eq!(PacketType::try_from(1).unwrap(), PacketType::Connect);
        assert_eq!(PacketType::try_from(14).unwrap(), PacketType::Disconnect);
        assert_eq!(
            PacketType::try_from(0),
            Err(ProtocolError::InvalidPacketType(0))
        );
        assert_eq!(
            PacketType::try_from(15),
            Err(ProtocolError::InvalidPacketType(15))
        );
    }

    #[test]
    fn test_connack_reasons() {
        assert_eq!(ConnackCode::from_u8(0), Some(ConnackCode::Accepted));
        assert_eq!(
            ConnackCode::from_u8(4).map(ConnackCode::reason),
            Some("Connection Refused: bad user name or password")
        );
        assert_eq!(ConnackCode::from_u8(6), None);
    }

    #[test]
    fn test_encode_connect_with_credentials() {
        let connect = Connect {
            client_id: "c1",
            keep_alive: 30,
            clean_session: false,
            will: None,
            username: Some("abcd"),
            password: Some("123456"),
        };
        let mut buf = Vec::new();
        encode_connect(&connect, &mut buf);

        let mut expected = vec![0x10, 30, 0x00, 0x06];
        expected.extend_from_slice(b"MQIsdp");
        expected.extend_from_slice(&[0x03, 0xC0, 0x00, 0x1E]);
        expected.extend_from_slice(&[0x00, 0x02]);
        expected.extend_from_slice(b"c1");
        expected.extend_from_slice(&[0x00, 0x04]);
        expected.extend_from_slice(b"abcd");
        expected.extend_from_slice(&[0x00, 0x06]);
        expected.extend_from_slice(b"123456");
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_encode_connect_will_flags() {
        let connect = Connect {
            client_id: "c",
            keep_alive: 10,
            clean_session: true,
            will: Some(LastWill {
                topic: "status",
                message: b"offline",
                qos: QoS::AtLeastOnce,
                retain: true,
            }),
            username: None,
            password: None,
        };
        let mut buf = Vec::new();
        encode_connect(&connect, &mut buf);

        // flags follow the 2-byte header, 8-byte name and version byte
        assert_eq!(buf[11], 0x2E);
        let will_topic = &buf[17..25];
        assert_eq!(will_topic, b"\x00\x06status");
        assert!(buf.ends_with(b"\x00\x07offline"));
    }

    #[test]
    fn test_encode_publish_qos2() {
        let publish = Publish {
            dup: false,
            qos: QoS::ExactlyOnce,
            retain: false,
            topic: Bytes::from_static(b"abc"),
            message_id: Some(1),
            payload: Bytes::from_static(b"123"),
        };
        let mut buf = Vec::new();
        encode_publish(&publish, &mut buf);
        assert_eq!(
            buf,
            vec![0x34, 0x0A, 0x00, 0x03, b'a', b'b', b'c', 0x00, 0x01, b'1', b'2', b'3']
        );
    }

    #[test]
    fn test_publish_length_limits() {
        let publish = |topic_len: usize, qos: QoS| Publish {
            dup: false,
            qos,
            retain: false,
            topic: Bytes::from(vec![b'a'; topic_len]),
            message_id: None,
            payload: Bytes::from_static(b"x"),
        };

        assert!(publish(MAX_STRING_LEN, QoS::AtMostOnce).validate().is_ok());
        assert_eq!(publish(3, QoS::AtMostOnce).remaining_length(), 6);
        assert_eq!(publish(3, QoS::ExactlyOnce).remaining_length(), 8);
        assert_eq!(
            publish(MAX_STRING_LEN + 1, QoS::AtLeastOnce).validate(),
            Err(ProtocolError::StringTooLong {
                field: "topic",
                len: 65536,
            })
        );

        assert!(check_remaining_length(MAX_REMAINING_LENGTH).is_ok());
        assert_eq!(
            check_remaining_length(MAX_REMAINING_LENGTH + 1),
            Err(ProtocolError::PacketTooLarge(MAX_REMAINING_LENGTH + 1))
        );
        assert!(check_string("client id", &[0; 23]).is_ok());
    }

    #[test]
    fn test_decode_publish() {
        let frame = Bytes::from_static(&[
            0x32, 0x09, 0x00, 0x03, b'a', b'/', b'b', 0x12, 0x34, b'h', b'i',
        ]);
        let header = decode_fixed_header(&frame).unwrap().unwrap();
        let publish = decode_publish(&header, &frame).unwrap();
        assert_eq!(publish.qos, QoS::AtLeastOnce);
        assert_eq!(publish.topic.as_ref(), b"a/b");
        assert_eq!(publish.message_id, Some(0x1234));
        assert_eq!(publish.payload.as_ref(), b"hi");

        let frame = Bytes::from_static(&[0x31, 0x04, 0x00, 0x01, b't', b'x']);
        let header = decode_fixed_header(&frame).unwrap().unwrap();
        let publish = decode_publish(&header, &frame).unwrap();
        assert!(publish.retain);
        assert_eq!(publish.message_id, None);
        assert_eq!(publish.payload.as_ref(), b"x");
    }

    #[test]
    fn test_decode_publish_truncated() {
        let frame = Bytes::from_static(&[0x32, 0x04, 0x00, 0x03, b'a', b'b']);
        let header = decode_fixed_header(&frame).unwrap().unwrap();
        assert!(matches!(
            decode_publish(&header, &frame),
            Err(ProtocolError::MalformedFrame { kind: "PUBLISH", .. })
        ));
    }

    #[test]
    fn test_decode_publish_invalid_qos() {
        let frame = Bytes::from_static(&[0x36, 0x02, 0x00, 0x00]);
        let header = decode_fixed_header(&frame).unwrap().unwrap();
        assert_eq!(
            decode_publish(&header, &frame),
            Err(ProtocolError::InvalidQoS(3))
        );
    }

    #[test]
    fn test_encode_acks() {
        let mut buf = Vec::new();
        encode_ack(PacketType::Puback, 0x0102, &mut buf);
        encode_ack(PacketType::Pubrec, 7, &mut buf);
        encode_ack(PacketType::Pubrel, 7, &mut buf);
        encode_ack(PacketType::Pubcomp, 7, &mut buf);
        assert_eq!(
            buf,
            vec![
                0x40, 0x02, 0x01, 0x02, //
                0x50, 0x02, 0x00, 0x07, //
                0x62, 0x02, 0x00, 0x07, //
                0x70, 0x02, 0x00, 0x07,
            ]
        );
    }

    #[test]
    fn test_encode_subscribe_unsubscribe() {
        let mut buf = Vec::new();
        encode_subscribe(1, b"a/#", QoS::AtLeastOnce, &mut buf);
        assert_eq!(
            buf,
            vec![0x82, 0x08, 0x00, 0x01, 0x00, 0x03, b'a', b'/', b'#', 0x01]
        );

        buf.clear();
        encode_unsubscribe(2, b"a/#", &mut buf);
        assert_eq!(buf, vec![0xA2, 0x07, 0x00, 0x02, 0x00, 0x03, b'a', b'/', b'#']);
    }

    #[test]
    fn test_encode_two_byte_packets() {
        let mut buf = Vec::new();
        encode_pingreq(&mut buf);
        encode_pingresp(&mut buf);
        encode_disconnect(&mut buf);
        assert_eq!(buf, vec![0xC0, 0x00, 0xD0, 0x00, 0xE0, 0x00]);
    }
}
