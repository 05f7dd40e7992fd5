//! Frame struct and outbound frame building.
//!
//! Represents a complete protocol frame with header and body.
//! Uses `bytes::Bytes` for zero-copy body sharing.
//!
//! # Example
//!
//! ```
//! use danmaku_client::protocol::{encode, Frame, Operation};
//!
//! let bytes = encode(b"[object Object]", Operation::Heartbeat);
//! let frame = Frame::parse(&bytes).unwrap();
//!
//! assert_eq!(frame.op(), Some(Operation::Heartbeat));
//! assert_eq!(frame.body(), b"[object Object]");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, Operation, HEADER_SIZE};
use crate::error::{DanmakuError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Body bytes (zero-copy via `bytes::Bytes`).
    pub body: Bytes,
}

impl Frame {
    /// Parse exactly one frame from the start of `buf`.
    ///
    /// Trailing bytes past `total_length` are ignored.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let header = Header::decode(buf)?;
        let end = header.total_length as usize;
        if buf.len() < end {
            return Err(DanmakuError::MalformedHeader(format!(
                "total length {} exceeds buffer of {}",
                end,
                buf.len()
            )));
        }
        Ok(Self {
            header,
            body: Bytes::copy_from_slice(&buf[HEADER_SIZE..end]),
        })
    }

    /// Get a reference to the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Known operation, if the header carries one.
    #[inline]
    pub fn op(&self) -> Option<Operation> {
        self.header.op()
    }
}

/// Build a complete frame with default header fields.
///
/// `total_length = body.len() + 16`, header length 16, protocol version 1,
/// sequence 1.
pub fn encode(body: &[u8], operation: Operation) -> Bytes {
    build_frame(&Header::new(operation, body.len()), body)
}

/// Build a complete frame from an explicit header.
///
/// The caller is responsible for `header.total_length` matching the body.
pub fn build_frame(header: &Header, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(body);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BodyProtocol, DEFAULT_PROTOCOL_VERSION};

    #[test]
    fn test_encode_header_fields() {
        for (body, op) in [
            (&b""[..], Operation::Heartbeat),
            (&b"{\"uid\":0}"[..], Operation::UserAuthentication),
            (&[0u8; 300][..], Operation::Message),
        ] {
            let bytes = encode(body, op);
            let header = Header::decode(&bytes).unwrap();
            assert_eq!(header.total_length as usize, body.len() + 16);
            assert_eq!(header.header_length, 16);
            assert_eq!(header.op(), Some(op));
            assert_eq!(header.protocol_version, DEFAULT_PROTOCOL_VERSION);
            assert_eq!(&bytes[HEADER_SIZE..], body);
        }
    }

    #[test]
    fn test_frame_parse_ignores_trailing_bytes() {
        let mut bytes = encode(b"abc", Operation::Message).to_vec();
        bytes.extend_from_slice(b"trailing");
        let frame = Frame::parse(&bytes).unwrap();
        assert_eq!(frame.body(), b"abc");
    }

    #[test]
    fn test_frame_parse_truncated() {
        let bytes = encode(b"abcdef", Operation::Message);
        assert!(Frame::parse(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_build_frame_with_override() {
        let header = Header::new(Operation::Message, 2)
            .with_protocol_version(BodyProtocol::Normal.code())
            .with_sequence(7);
        let bytes = build_frame(&header, b"{}");
        let frame = Frame::parse(&bytes).unwrap();
        assert_eq!(frame.header.protocol_version, 0);
        assert_eq!(frame.header.sequence, 7);
    }
}
