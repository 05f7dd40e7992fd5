//! Mapping from decoded packets to typed messages.

use serde_json::Value;

use super::command::Command;
use super::danmaku::ChatMessage;
use super::gift::GiftMessage;
use crate::handler::EventKind;
use crate::protocol::Packet;

/// A typed message ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    /// Reply to our heartbeat.
    HeartbeatReply {
        /// Room popularity count.
        popularity: u32,
    },
    /// Chat line.
    Chat(Box<ChatMessage>),
    /// Gift.
    Gift(GiftMessage),
    /// Room started broadcasting.
    RoomLive {
        /// Room id, when the command carries one.
        room_id: Option<i64>,
    },
    /// Room stopped broadcasting.
    RoomPreparing {
        /// Room id, when the command carries one.
        room_id: Option<i64>,
    },
    /// Any command without a typed model, kept as JSON.
    Passthrough {
        /// Base command name, if the object had a `cmd` string.
        cmd: Option<String>,
        /// The full command object.
        body: Value,
    },
}

impl DecodedMessage {
    /// Event kind listeners are keyed by.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::HeartbeatReply { .. } => EventKind::HeartbeatReply,
            Self::Chat(_) => EventKind::Danmaku,
            Self::Gift(_) => EventKind::Gift,
            Self::RoomLive { .. } => EventKind::Live,
            Self::RoomPreparing { .. } => EventKind::Preparing,
            Self::Passthrough { cmd: Some(cmd), .. } => EventKind::Command(cmd.clone()),
            Self::Passthrough { cmd: None, .. } => EventKind::Unknown,
        }
    }
}

impl From<Packet> for DecodedMessage {
    fn from(packet: Packet) -> Self {
        match packet {
            Packet::HeartbeatReply { popularity } => Self::HeartbeatReply { popularity },
            Packet::Json(value) => interpret(value),
        }
    }
}

/// Interpret one pushed JSON command.
///
/// Commands whose shape does not match their typed model are logged and
/// passed through unchanged.
pub fn interpret(value: Value) -> DecodedMessage {
    let command = match value.get("cmd").and_then(Value::as_str) {
        Some(cmd) => Command::parse(cmd),
        None => return DecodedMessage::Passthrough { cmd: None, body: value },
    };

    match &command {
        Command::Danmaku => {
            let info = value.get("info").unwrap_or(&Value::Null);
            match ChatMessage::from_info(info) {
                Ok(Some(chat)) => return DecodedMessage::Chat(Box::new(chat)),
                Ok(None) => {}
                Err(e) => tracing::warn!("Passing chat command through: {}", e),
            }
        }
        Command::SendGift => {
            let data = value.get("data").cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<GiftMessage>(data) {
                Ok(gift) => return DecodedMessage::Gift(gift),
                Err(e) => tracing::warn!("Passing gift command through: {}", e),
            }
        }
        Command::Live => {
            return DecodedMessage::RoomLive {
                room_id: room_id(&value),
            }
        }
        Command::Preparing => {
            return DecodedMessage::RoomPreparing {
                room_id: room_id(&value),
            }
        }
        Command::Other(_) => {}
    }

    DecodedMessage::Passthrough {
        cmd: Some(command.as_str().to_string()),
        body: value,
    }
}

/// `roomid` is sent as a number by some commands and a string by others.
fn room_id(value: &Value) -> Option<i64> {
    match value.get("roomid")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
