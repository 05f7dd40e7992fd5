//! Transport module - duplex byte-buffer channel to the relay host.
//!
//! The session only needs four primitives: open, send, receive and close.
//! They are expressed as two traits so tests can inject an in-memory
//! transport:
//! - [`Connector`] opens a connection to a URL
//! - [`Transport`] moves already-framed byte buffers
//!
//! [`WebSocketConnector`] is the production implementation; [`memory`]
//! provides an in-process pair for tests.

pub mod memory;
mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use memory::{memory_pair, MemoryConnector, MemoryPeer, MemoryTransport};
pub use websocket::{WebSocketConnector, WebSocketTransport};

/// An open duplex connection delivering whole messages.
///
/// Implementations must tolerate one reader and one writer calling
/// concurrently. Concurrent `send` calls are serialized by the caller.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one message.
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Wait for the next message. `Ok(None)` is end of stream.
    async fn recv(&self) -> Result<Option<Bytes>>;

    /// Close the connection. Calling it more than once is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Opens [`Transport`]s.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`.
    async fn open(&self, url: &str) -> Result<Arc<dyn Transport>>;
}
