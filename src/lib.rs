//! # danmaku-client
//!
//! Async client for the live-room danmaku push protocol.
//!
//! A session opens a WebSocket to a chat relay, authenticates with a token
//! from the connection-parameter lookup, sends a heartbeat every 30 seconds
//! and decodes the inbound binary stream into typed events.
//!
//! ## Architecture
//!
//! - **Lookup** (HTTPS): `RoomInfoClient` resolves a room id to a relay URL and token
//! - **Wire** (WebSocket): 16-byte big-endian frame headers, nested units,
//!   brotli-compressed batches
//! - **Dispatch**: decoded messages fan out to listeners keyed by [`EventKind`]
//!
//! ```text
//! transport bytes ─► FrameDecoder ─► Packet ─► interpret ─► EventDispatcher ─► listeners
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use danmaku_client::{DecodedMessage, EventKind, RoomInfoClient, Session, WebSocketConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let params = RoomInfoClient::new().connection_params(23219374).await?;
//!
//!     let session = Session::builder(23219374)
//!         .on(EventKind::Danmaku, |msg: &DecodedMessage| {
//!             if let DecodedMessage::Chat(chat) = msg {
//!                 println!("{}: {}", chat.username, chat.text);
//!             }
//!             Ok(())
//!         })
//!         .build()?;
//!
//!     let end = session.run(&WebSocketConnector::new(), &params).await?;
//!     println!("stopped: {:?}", end);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod control;
pub mod error;
pub mod handler;
pub mod message;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod writer;

pub use control::{ConnectionParams, RoomInfoClient};
pub use error::{DanmakuError, Result};
pub use handler::{listener, EventDispatcher, EventKind, EventListener, Listener};
pub use message::{ChatKind, ChatMessage, DecodedMessage, GiftMessage};
pub use session::{Session, SessionBuilder, SessionConfig, SessionEnd, SessionState};
pub use transport::{Connector, Transport, WebSocketConnector};
