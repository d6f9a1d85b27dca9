//! mqisdp-core - MQTT v3.1 wire format.
//!
//! This crate provides the stateless frame codec (fixed header, remaining
//! length, packet encoders) and the stream reassembler that turns arbitrary
//! transport chunks into complete frames. It performs no I/O.

pub mod error;
pub mod packet;
pub mod reassembler;

pub use error::{ProtocolError, Result};
pub use packet::*;
pub use reassembler::{Frame, Reassembler};
