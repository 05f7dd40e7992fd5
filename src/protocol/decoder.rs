//! Inbound frame decoder.
//!
//! A single transport delivery may hold several frames back to back, and a
//! `Message` frame's body may be compressed into a buffer that is itself a
//! run of frames. Decoding walks an explicit worklist instead of recursing:
//!
//! ```text
//! transport buffer
//!   ├─ frame (HeartbeatReply)            -> Packet::HeartbeatReply
//!   ├─ frame (Message, protover 0)       -> Packet::Json
//!   └─ frame (Message, protover 3)
//!        └─ brotli ─► frame, frame, ...  -> pushed back onto the worklist
//! ```
//!
//! Failures are isolated per nested unit. Only a bad header in the
//! transport buffer itself (depth 0) fails the whole call.

use bytes::Bytes;
use serde_json::Value;

use super::wire_format::{BodyProtocol, Header, Operation, HEADER_SIZE};
use crate::codec::{BrotliExpander, JsonCodec, PayloadExpander};
use crate::error::{DanmakuError, Result};

/// Maximum number of compressed layers followed before a unit is dropped.
pub const MAX_NESTING_DEPTH: usize = 8;

/// Bytes needed to read a nested unit's length (4) and header size (2).
const UNIT_PREFIX_SIZE: usize = 6;

/// A body extracted from the stream, before interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Heartbeat reply carrying the room popularity count.
    HeartbeatReply {
        /// Popularity count (4-byte big-endian body).
        popularity: u32,
    },
    /// One JSON command object pushed by the server.
    Json(Value),
}

/// Pending worklist entry.
#[derive(Debug)]
enum Work {
    /// Buffer that starts with a frame header.
    Frames { buf: Bytes, depth: usize },
    /// Already decoded packet, emitted in worklist order.
    Emit(Packet),
}

/// Decodes transport buffers into [`Packet`]s.
///
/// # Example
///
/// ```
/// use danmaku_client::protocol::{encode, FrameDecoder, Operation, Packet};
///
/// let reply = encode(&42u32.to_be_bytes(), Operation::HeartbeatReply);
/// let packets = FrameDecoder::new().decode(&reply).unwrap();
/// assert_eq!(packets, vec![Packet::HeartbeatReply { popularity: 42 }]);
/// ```
#[derive(Debug, Clone)]
pub struct FrameDecoder<E = BrotliExpander> {
    expander: E,
    max_depth: usize,
}

impl FrameDecoder<BrotliExpander> {
    /// Create a decoder using the brotli expander.
    pub fn new() -> Self {
        Self::with_expander(BrotliExpander)
    }
}

impl Default for FrameDecoder<BrotliExpander> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PayloadExpander> FrameDecoder<E> {
    /// Create a decoder with a custom expander.
    pub fn with_expander(expander: E) -> Self {
        Self {
            expander,
            max_depth: MAX_NESTING_DEPTH,
        }
    }

    /// Override the maximum compressed nesting depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Decode one transport buffer into packets, in arrival order.
    ///
    /// # Errors
    ///
    /// `MalformedHeader` if a frame header at the transport level is short or
    /// declares a header size other than 16. Failures inside a `Message`
    /// frame's nested units are logged and skipped.
    pub fn decode(&self, buf: &[u8]) -> Result<Vec<Packet>> {
        let mut packets = Vec::new();
        let mut stack = vec![Work::Frames {
            buf: Bytes::copy_from_slice(buf),
            depth: 0,
        }];

        while let Some(work) = stack.pop() {
            match work {
                Work::Emit(packet) => packets.push(packet),
                Work::Frames { buf, depth } => {
                    if let Err(e) = self.decode_frames(buf, depth, &mut stack) {
                        if depth == 0 {
                            return Err(e);
                        }
                        tracing::warn!(depth, "Dropping nested frame: {}", e);
                    }
                }
            }
        }

        Ok(packets)
    }

    /// Handle a buffer that starts with a frame header.
    fn decode_frames(&self, buf: Bytes, depth: usize, stack: &mut Vec<Work>) -> Result<()> {
        let header = Header::decode(&buf)?;
        let total = header.total_length as usize;

        // Several frames back to back: split off the first, keep the rest.
        // Pushed in reverse so the first frame is popped first.
        if total < buf.len() {
            stack.push(Work::Frames {
                buf: buf.slice(total..),
                depth,
            });
            stack.push(Work::Frames {
                buf: buf.slice(..total),
                depth,
            });
            return Ok(());
        }

        match header.op() {
            Some(Operation::HeartbeatReply) => {
                let body = &buf[HEADER_SIZE..];
                if body.len() < 4 {
                    return Err(DanmakuError::MalformedHeader(format!(
                        "heartbeat reply body of {} bytes",
                        body.len()
                    )));
                }
                let popularity = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                stack.push(Work::Emit(Packet::HeartbeatReply { popularity }));
            }
            Some(Operation::Message) => {
                let work = self.decode_units(&buf, &header, depth);
                stack.extend(work.into_iter().rev());
            }
            Some(Operation::ConnectSuccess) | Some(Operation::UserAuthentication) => {
                tracing::debug!(op = header.operation, "Auth acknowledgement");
            }
            Some(Operation::Heartbeat) | None => {
                tracing::debug!(op = header.operation, "Ignoring frame");
            }
        }

        Ok(())
    }

    /// Walk the nested units of a `Message` frame.
    ///
    /// Each unit starts with its own 4-byte length and 2-byte header size,
    /// beginning at byte 0 of `buf`. The payload spans
    /// `[offset + header_size, offset + length)`.
    fn decode_units(&self, buf: &Bytes, header: &Header, depth: usize) -> Vec<Work> {
        let mut work = Vec::new();
        let mut offset = 0;

        while offset < buf.len() {
            if buf.len() - offset < UNIT_PREFIX_SIZE {
                tracing::warn!(offset, "Truncated nested unit");
                break;
            }

            let len = u32::from_be_bytes([
                buf[offset],
                buf[offset + 1],
                buf[offset + 2],
                buf[offset + 3],
            ]) as usize;
            let header_size = u16::from_be_bytes([buf[offset + 4], buf[offset + 5]]) as usize;

            if len == 0 || header_size > len || offset + len > buf.len() {
                tracing::warn!(
                    offset,
                    len,
                    header_size,
                    available = buf.len() - offset,
                    "Nested unit bounds out of range"
                );
                break;
            }

            let payload = buf.slice(offset + header_size..offset + len);
            match self.decode_unit(payload, header.protocol_version, depth) {
                Ok(mut unit) => work.append(&mut unit),
                Err(e) => tracing::warn!(offset, "Skipping nested unit: {}", e),
            }

            offset += len;
        }

        work
    }

    /// Decode one nested unit's payload according to the body protocol.
    fn decode_unit(&self, payload: Bytes, protocol_version: u16, depth: usize) -> Result<Vec<Work>> {
        match BodyProtocol::from_code(protocol_version) {
            Some(BodyProtocol::Normal) => {
                if payload.is_empty() {
                    return Ok(Vec::new());
                }
                let value: Value = JsonCodec::decode(&payload)?;
                Ok(json_packets(value))
            }
            Some(protocol @ (BodyProtocol::Brotli | BodyProtocol::Zlib)) => {
                if depth + 1 > self.max_depth {
                    return Err(DanmakuError::Decompression(format!(
                        "compressed nesting deeper than {}",
                        self.max_depth
                    )));
                }
                let expanded = self.expander.expand(&payload, protocol)?;
                Ok(vec![Work::Frames {
                    buf: Bytes::from(expanded),
                    depth: depth + 1,
                }])
            }
            _ => Err(DanmakuError::UnsupportedProtocolVersion(protocol_version)),
        }
    }
}

/// One packet per JSON object; top-level arrays are flattened.
fn json_packets(value: Value) -> Vec<Work> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter(|item| !item.is_null())
            .map(|item| Work::Emit(Packet::Json(item)))
            .collect(),
        Value::Null => Vec::new(),
        other => vec![Work::Emit(Packet::Json(other))],
    }
}

/// Decode a transport buffer with the default brotli expander.
pub fn decode(buf: &[u8]) -> Result<Vec<Packet>> {
    FrameDecoder::new().decode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::build_frame;
    use serde_json::json;
    use std::io::Write;

    fn message_frame(protocol: BodyProtocol, body: &[u8]) -> Vec<u8> {
        let header = Header::new(Operation::Message, body.len())
            .with_protocol_version(protocol.code());
        build_frame(&header, body).to_vec()
    }

    fn json_frame(value: &Value) -> Vec<u8> {
        message_frame(BodyProtocol::Normal, &serde_json::to_vec(value).unwrap())
    }

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            writer.write_all(data).unwrap();
        }
        out
    }

    #[test]
    fn test_heartbeat_reply() {
        let bytes = build_frame(&Header::new(Operation::HeartbeatReply, 4), &1234u32.to_be_bytes());
        let packets = decode(&bytes).unwrap();
        assert_eq!(packets, vec![Packet::HeartbeatReply { popularity: 1234 }]);
    }

    #[test]
    fn test_heartbeat_reply_short_body_is_fatal_at_top_level() {
        let bytes = build_frame(&Header::new(Operation::HeartbeatReply, 2), &[0, 1]);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_single_json_message() {
        let bytes = json_frame(&json!({"cmd": "LIVE", "roomid": 1}));
        let packets = decode(&bytes).unwrap();
        assert_eq!(packets, vec![Packet::Json(json!({"cmd": "LIVE", "roomid": 1}))]);
    }

    #[test]
    fn test_two_concatenated_frames_keep_order() {
        let mut bytes = json_frame(&json!({"cmd": "FIRST"}));
        bytes.extend(json_frame(&json!({"cmd": "SECOND"})));

        let packets = decode(&bytes).unwrap();
        assert_eq!(
            packets,
            vec![
                Packet::Json(json!({"cmd": "FIRST"})),
                Packet::Json(json!({"cmd": "SECOND"})),
            ]
        );
    }

    #[test]
    fn test_mixed_operations_in_one_buffer() {
        let mut bytes =
            build_frame(&Header::new(Operation::HeartbeatReply, 4), &7u32.to_be_bytes()).to_vec();
        bytes.extend(json_frame(&json!({"cmd": "A"})));
        bytes.extend(build_frame(&Header::new(Operation::ConnectSuccess, 0), b"").to_vec());
        bytes.extend(json_frame(&json!({"cmd": "B"})));

        let packets = decode(&bytes).unwrap();
        assert_eq!(
            packets,
            vec![
                Packet::HeartbeatReply { popularity: 7 },
                Packet::Json(json!({"cmd": "A"})),
                Packet::Json(json!({"cmd": "B"})),
            ]
        );
    }

    #[test]
    fn test_compressed_message_expands_to_inner_frames() {
        let mut inner = json_frame(&json!({"cmd": "DANMU_MSG", "n": 1}));
        inner.extend(json_frame(&json!({"cmd": "SEND_GIFT", "n": 2})));
        let bytes = message_frame(BodyProtocol::Brotli, &compress(&inner));

        let packets = decode(&bytes).unwrap();
        assert_eq!(
            packets,
            vec![
                Packet::Json(json!({"cmd": "DANMU_MSG", "n": 1})),
                Packet::Json(json!({"cmd": "SEND_GIFT", "n": 2})),
            ]
        );
    }

    #[test]
    fn test_compressed_order_preserved_between_siblings() {
        let inner = json_frame(&json!({"cmd": "INNER"}));
        let mut bytes = message_frame(BodyProtocol::Brotli, &compress(&inner));
        bytes.extend(json_frame(&json!({"cmd": "AFTER"})));

        let packets = decode(&bytes).unwrap();
        assert_eq!(
            packets,
            vec![
                Packet::Json(json!({"cmd": "INNER"})),
                Packet::Json(json!({"cmd": "AFTER"})),
            ]
        );
    }

    #[test]
    fn test_json_array_body_is_flattened() {
        let bytes = json_frame(&json!([{"cmd": "A"}, {"cmd": "B"}]));
        let packets = decode(&bytes).unwrap();
        assert_eq!(packets.len(), 2);
    }

    #[test]
    fn test_empty_json_payload_yields_nothing() {
        let bytes = message_frame(BodyProtocol::Normal, b"");
        assert!(decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_unit_does_not_lose_sibling() {
        let mut inner = message_frame(BodyProtocol::Normal, b"{\"cmd\":");
        inner.extend(json_frame(&json!({"cmd": "GOOD"})));
        let bytes = message_frame(BodyProtocol::Brotli, &compress(&inner));

        let packets = decode(&bytes).unwrap();
        assert_eq!(packets, vec![Packet::Json(json!({"cmd": "GOOD"}))]);
    }

    #[test]
    fn test_corrupt_compressed_unit_is_skipped() {
        let mut bytes = message_frame(BodyProtocol::Brotli, &[0x1c, 0, 0, 0]);
        bytes.extend(json_frame(&json!({"cmd": "OK"})));

        let packets = decode(&bytes).unwrap();
        assert_eq!(packets, vec![Packet::Json(json!({"cmd": "OK"}))]);
    }

    #[test]
    fn test_bad_header_inside_compressed_body_is_isolated() {
        let mut inner = json_frame(&json!({"cmd": "KEPT"}));
        let mut broken = json_frame(&json!({"cmd": "LOST"}));
        broken[4..6].copy_from_slice(&12u16.to_be_bytes());
        inner.extend(broken);
        let bytes = message_frame(BodyProtocol::Brotli, &compress(&inner));

        let packets = decode(&bytes).unwrap();
        assert_eq!(packets, vec![Packet::Json(json!({"cmd": "KEPT"}))]);
    }

    #[test]
    fn test_malformed_header_at_top_level() {
        let mut bytes = json_frame(&json!({"cmd": "X"}));
        bytes[4..6].copy_from_slice(&18u16.to_be_bytes());
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, DanmakuError::MalformedHeader(_)));

        // The decoder itself is stateless; a well-formed buffer still decodes.
        assert_eq!(decode(&json_frame(&json!({"cmd": "Y"}))).unwrap().len(), 1);
    }

    #[test]
    fn test_short_buffer() {
        assert!(matches!(
            decode(&[0u8; 10]),
            Err(DanmakuError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_zlib_body_is_rejected_per_unit() {
        let mut bytes = message_frame(BodyProtocol::Zlib, b"\x78\x9c");
        bytes.extend(json_frame(&json!({"cmd": "OK"})));
        let packets = decode(&bytes).unwrap();
        assert_eq!(packets, vec![Packet::Json(json!({"cmd": "OK"}))]);
    }

    #[test]
    fn test_depth_limit() {
        let inner = json_frame(&json!({"cmd": "DEEP"}));
        let once = message_frame(BodyProtocol::Brotli, &compress(&inner));
        let twice = message_frame(BodyProtocol::Brotli, &compress(&once));

        assert_eq!(decode(&twice).unwrap().len(), 1);
        let shallow = FrameDecoder::new().max_depth(1);
        assert!(shallow.decode(&twice).unwrap().is_empty());
    }

    #[test]
    fn test_depth_limit_reports_decompression_error() {
        let inner = json_frame(&json!({"cmd": "DEEP"}));
        let shallow = FrameDecoder::new().max_depth(1);
        let err = shallow
            .decode_unit(Bytes::from(compress(&inner)), BodyProtocol::Brotli.code(), 1)
            .unwrap_err();
        assert!(matches!(err, DanmakuError::Decompression(ref m) if m.contains("deeper than 1")));
    }

    #[test]
    fn test_auth_ack_emits_nothing() {
        let bytes = build_frame(&Header::new(Operation::ConnectSuccess, 11), b"{\"code\":0}X");
        assert!(decode(&bytes).unwrap().is_empty());
    }
}
