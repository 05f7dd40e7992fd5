//! Message module - typed interpretation of pushed commands.
//!
//! Pushed commands are JSON objects discriminated by their `cmd` string.
//! Known commands decode into typed variants of [`DecodedMessage`]; anything
//! else is carried through as JSON.
//!
//! # Example
//!
//! ```
//! use danmaku_client::message::{interpret, DecodedMessage};
//!
//! let msg = interpret(serde_json::json!({"cmd": "LIVE", "roomid": 1}));
//! assert_eq!(msg, DecodedMessage::RoomLive { room_id: Some(1) });
//! ```

mod command;
mod danmaku;
mod decoded;
mod gift;

pub use command::Command;
pub use danmaku::{layout, ChatKind, ChatMessage, CheckInfo};
pub use decoded::{interpret, DecodedMessage};
pub use gift::GiftMessage;
