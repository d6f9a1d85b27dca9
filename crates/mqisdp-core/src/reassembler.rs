//! Stream reassembly.
//!
//! A byte-stream transport delivers chunks with no regard for frame
//! boundaries: one read may hold half a header, a whole frame plus the
//! start of the next, or several frames. [`Reassembler`] buffers whatever is
//! incomplete and emits each complete frame exactly once, in arrival order.

use bytes::{Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::packet::{decode_fixed_header, FixedHeader, PacketType};

/// Upper bound on the buffer reserved from a frame's declared length.
/// Larger frames grow the buffer as their bytes arrive.
const MAX_PREALLOC: usize = 64 * 1024;

/// One complete frame: fixed header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FixedHeader,
    bytes: Bytes,
}

impl Frame {
    pub fn header(&self) -> &FixedHeader {
        &self.header
    }

    /// The whole frame, fixed header included.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Everything after the fixed header.
    pub fn body(&self) -> &[u8] {
        &self.bytes[self.header.header_len..]
    }

    pub fn packet_type(&self) -> Result<PacketType> {
        self.header.packet_type()
    }

    /// Require the frame to be at least `min` bytes long.
    pub fn ensure_len(&self, kind: &'static str, min: usize) -> Result<()> {
        let min = min.max(self.header.header_len + 2);
        if self.bytes.len() < min {
            return Err(ProtocolError::MalformedFrame {
                kind,
                expected: min,
                actual: self.bytes.len(),
            });
        }
        Ok(())
    }

    /// Message id carried in the first two body bytes, if present.
    pub fn message_id(&self) -> Option<u16> {
        match self.body() {
            [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    /// Fixed header not yet complete.
    Header(BytesMut),
    /// Header known, body still arriving. `buf` holds the header bytes too.
    Payload { header: FixedHeader, buf: BytesMut },
}

/// Incremental frame reassembler.
#[derive(Debug, Default)]
pub struct Reassembler {
    state: State,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no partial frame is buffered.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// Number of bytes held for an incomplete frame.
    pub fn buffered(&self) -> usize {
        match &self.state {
            State::Idle => 0,
            State::Header(partial) => partial.len(),
            State::Payload { buf, .. } => buf.len(),
        }
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }

    /// Feed one chunk, pushing every frame it completes onto `out`.
    ///
    /// An invalid remaining length cannot be resynchronised: the buffered
    /// state is discarded and the error returned. Frames completed earlier in
    /// the same chunk are already in `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<Frame>) -> Result<()> {
        let mut rest = chunk;

        loop {
            match std::mem::take(&mut self.state) {
                State::Idle => {
                    if rest.is_empty() {
                        return Ok(());
                    }
                    let header = match decode_fixed_header(rest) {
                        Ok(Some(header)) => header,
                        Ok(None) => {
                            self.state = State::Header(BytesMut::from(rest));
                            return Ok(());
                        }
                        Err(e) => {
                            log::debug!("discarding {} bytes: {}", rest.len(), e);
                            return Err(e);
                        }
                    };

                    let total = header.frame_len();
                    if rest.len() >= total {
                        out.push(Frame {
                            header,
                            bytes: Bytes::copy_from_slice(&rest[..total]),
                        });
                        rest = &rest[total..];
                    } else {
                        let mut buf = BytesMut::with_capacity(total.min(MAX_PREALLOC));
                        buf.extend_from_slice(rest);
                        self.state = State::Payload { header, buf };
                        return Ok(());
                    }
                }
                State::Header(mut partial) => {
                    // Header is at most 5 bytes, so take one byte at a time.
                    loop {
                        match decode_fixed_header(&partial) {
                            Ok(Some(header)) => {
                                let mut buf =
                                    BytesMut::with_capacity(header.frame_len().min(MAX_PREALLOC));
                                buf.extend_from_slice(&partial);
                                self.state = State::Payload { header, buf };
                                break;
                            }
                            Ok(None) => {
                                let Some((&byte, tail)) = rest.split_first() else {
                                    self.state = State::Header(partial);
                                    return Ok(());
                                };
                                partial.extend_from_slice(&[byte]);
                                rest = tail;
                            }
                            Err(e) => {
                                log::debug!("discarding {} header bytes: {}", partial.len(), e);
                                return Err(e);
                            }
                        }
                    }
                }
                State::Payload { header, mut buf } => {
                    let need = header.frame_len() - buf.len();
                    if rest.len() < need {
                        buf.extend_from_slice(rest);
                        self.state = State::Payload { header, buf };
                        return Ok(());
                    }
                    buf.extend_from_slice(&rest[..need]);
                    rest = &rest[need..];
                    out.push(Frame {
                        header,
                        bytes: buf.freeze(),
                    });
                }
            }
        }
    }
}
