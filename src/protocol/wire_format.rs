//! Wire format encoding and decoding.
//!
//! Implements the 16-byte frame header:
//! ```text
//! ┌──────────────┬───────────────┬──────────┬───────────┬──────────┐
//! │ Total length │ Header length │ Protover │ Operation │ Sequence │
//! │ 4 bytes      │ 2 bytes       │ 2 bytes  │ 4 bytes   │ 4 bytes  │
//! │ uint32 BE    │ uint16 BE     │ uint16 BE│ uint32 BE │ uint32 BE│
//! └──────────────┴───────────────┴──────────┴───────────┴──────────┘
//! ```
//!
//! `total_length` counts header + body. All multi-byte integers are Big Endian.

use crate::error::{DanmakuError, Result};

/// Header size in bytes (fixed, exactly 16).
pub const HEADER_SIZE: usize = 16;

/// Protocol version written on outbound frames unless overridden.
pub const DEFAULT_PROTOCOL_VERSION: u16 = 1;

/// Sequence written on outbound frames unless overridden.
pub const DEFAULT_SEQUENCE: u32 = 1;

/// Operation codes carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Operation {
    /// Client keep-alive.
    Heartbeat = 2,
    /// Server keep-alive reply; body is the popularity count.
    HeartbeatReply = 3,
    /// Push message; body holds one or more nested units.
    Message = 5,
    /// Client auth frame.
    UserAuthentication = 7,
    /// Server ack of the auth frame.
    ConnectSuccess = 8,
}

impl Operation {
    /// Map a raw operation code to a known operation.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            2 => Some(Self::Heartbeat),
            3 => Some(Self::HeartbeatReply),
            5 => Some(Self::Message),
            7 => Some(Self::UserAuthentication),
            8 => Some(Self::ConnectSuccess),
            _ => None,
        }
    }

    /// Raw wire code.
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Body encodings selected by the header's protocol-version field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BodyProtocol {
    /// Plain UTF-8 JSON.
    Normal = 0,
    /// 4-byte popularity count (heartbeat reply).
    Heartbeat = 1,
    /// zlib-compressed body. Reserved: no decode path.
    Zlib = 2,
    /// Brotli-compressed body holding further frames.
    Brotli = 3,
}

impl BodyProtocol {
    /// Map a raw protocol-version tag to a known body encoding.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Normal),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Zlib),
            3 => Some(Self::Brotli),
            _ => None,
        }
    }

    /// Raw wire tag.
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Header + body length in bytes.
    pub total_length: u32,
    /// Always [`HEADER_SIZE`] in this protocol version.
    pub header_length: u16,
    /// Body encoding tag (see [`BodyProtocol`]).
    pub protocol_version: u16,
    /// Operation code (see [`Operation`]).
    pub operation: u32,
    /// Sequence tag; not verified on receive.
    pub sequence: u32,
}

impl Header {
    /// Create a header for a body of `body_len` bytes with default version and sequence.
    pub fn new(operation: Operation, body_len: usize) -> Self {
        Self {
            total_length: (HEADER_SIZE + body_len) as u32,
            header_length: HEADER_SIZE as u16,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            operation: operation.code(),
            sequence: DEFAULT_SEQUENCE,
        }
    }

    /// Override the protocol-version tag.
    pub fn with_protocol_version(mut self, version: u16) -> Self {
        self.protocol_version = version;
        self
    }

    /// Override the sequence tag.
    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use danmaku_client::protocol::{Header, Operation};
    ///
    /// let header = Header::new(Operation::Heartbeat, 15);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 16);
    /// assert_eq!(&bytes[..4], &31u32.to_be_bytes());
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (16 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.total_length.to_be_bytes());
        buf[4..6].copy_from_slice(&self.header_length.to_be_bytes());
        buf[6..8].copy_from_slice(&self.protocol_version.to_be_bytes());
        buf[8..12].copy_from_slice(&self.operation.to_be_bytes());
        buf[12..16].copy_from_slice(&self.sequence.to_be_bytes());
    }

    /// Decode and validate a header from the start of `buf`.
    ///
    /// Fails with [`DanmakuError::MalformedHeader`] if fewer than 16 bytes are
    /// available, the header length field is not 16, or the total length is
    /// smaller than the header.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(DanmakuError::MalformedHeader(format!(
                "need {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let header = Self {
            total_length: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            header_length: u16::from_be_bytes([buf[4], buf[5]]),
            protocol_version: u16::from_be_bytes([buf[6], buf[7]]),
            operation: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            sequence: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
        };
        header.validate()?;
        Ok(header)
    }

    /// Validate the header for protocol compliance.
    pub fn validate(&self) -> Result<()> {
        if self.header_length as usize != HEADER_SIZE {
            return Err(DanmakuError::MalformedHeader(format!(
                "header length {} != {}",
                self.header_length, HEADER_SIZE
            )));
        }

        if (self.total_length as usize) < HEADER_SIZE {
            return Err(DanmakuError::MalformedHeader(format!(
                "total length {} shorter than header",
                self.total_length
            )));
        }

        Ok(())
    }

    /// Known operation, if the code is one.
    #[inline]
    pub fn op(&self) -> Option<Operation> {
        Operation::from_code(self.operation)
    }
}
