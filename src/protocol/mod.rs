//! Protocol module - wire format, frame building and inbound decoding.
//!
//! This module implements the binary framing of the push protocol:
//! - 16-byte header encoding/decoding
//! - Outbound frame building
//! - Recursive splitting of inbound buffers into packets

mod decoder;
mod frame;
mod wire_format;

pub use decoder::{decode, FrameDecoder, Packet, MAX_NESTING_DEPTH};
pub use frame::{build_frame, encode, Frame};
pub use wire_format::{
    BodyProtocol, Header, Operation, DEFAULT_PROTOCOL_VERSION, DEFAULT_SEQUENCE, HEADER_SIZE,
};
