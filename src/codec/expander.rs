//! Expansion of compressed frame bodies.
//!
//! The server compresses `Message` bodies with brotli when the auth frame
//! asks for `protover: 3`. The expanded buffer is itself a run of frames and
//! is fed back into the frame decoder.

use std::io::Read;

use crate::error::{DanmakuError, Result};
use crate::protocol::BodyProtocol;

/// Read buffer size handed to the brotli decoder.
const BROTLI_BUFFER_SIZE: usize = 4096;

/// Expands a compressed body given its protocol-version tag.
///
/// Implementations are stateless; one call expands one buffer.
pub trait PayloadExpander: Send + Sync {
    /// Expand `data` encoded as `protocol`.
    ///
    /// # Errors
    ///
    /// `Decompression` on corrupt input, `UnsupportedProtocolVersion` for
    /// tags the expander has no decode path for.
    fn expand(&self, data: &[u8], protocol: BodyProtocol) -> Result<Vec<u8>>;
}

/// Single-shot brotli expander.
///
/// zlib (`protover 2`) is reserved and rejected explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrotliExpander;

impl PayloadExpander for BrotliExpander {
    fn expand(&self, data: &[u8], protocol: BodyProtocol) -> Result<Vec<u8>> {
        match protocol {
            BodyProtocol::Brotli => {
                let mut out = Vec::with_capacity(data.len() * 4);
                brotli::Decompressor::new(data, BROTLI_BUFFER_SIZE)
                    .read_to_end(&mut out)
                    .map_err(|e| DanmakuError::Decompression(format!("brotli: {}", e)))?;
                Ok(out)
            }
            other => Err(DanmakuError::UnsupportedProtocolVersion(other.code())),
        }
    }
}
