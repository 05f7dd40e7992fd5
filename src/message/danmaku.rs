//! Chat line (`DANMU_MSG`) decoding.
//!
//! The chat command carries its fields in a positional `info` array rather
//! than named keys. The vendor does not document it; the indices below are
//! the contract this crate decodes against, see [`layout`].

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;

use crate::error::{DanmakuError, Result};

/// Positions inside the `info` array of a `DANMU_MSG` command.
///
/// Layout revision [`layout::VERSION`]. Any upstream drift should bump the
/// version together with the indices.
pub mod layout {
    /// Layout revision the indices below describe.
    pub const VERSION: u32 = 1;

    /// `info[0]`: metadata sub-array.
    pub const META: usize = 0;
    /// `info[1]`: chat text.
    pub const TEXT: usize = 1;
    /// `info[2]`: sender sub-array.
    pub const USER: usize = 2;
    /// `info[4]`: sender level sub-array.
    pub const LEVEL: usize = 4;
    /// `info[9]`: anti-spam `{ts, ct}` object.
    pub const CHECK_INFO: usize = 9;

    /// `info[0][1]`
    pub const META_MODE: usize = 1;
    /// `info[0][2]`
    pub const META_FONT_SIZE: usize = 2;
    /// `info[0][3]`
    pub const META_COLOR: usize = 3;
    /// `info[0][5]`
    pub const META_DAN_MU_ID: usize = 5;
    /// `info[0][9]`: kind discriminator (0 text, 1 emoji, 2 voice).
    pub const META_KIND: usize = 9;
    /// `info[0][12]`: emoji descriptor.
    pub const META_EMOJI: usize = 12;
    /// `info[0][13]`: extra emoji options.
    pub const META_EMOTICON_OPTIONS: usize = 13;
    /// `info[0][14]`: voice descriptor.
    pub const META_VOICE: usize = 14;
    /// `info[0][15]`: mode info object.
    pub const META_MODE_INFO: usize = 15;

    /// `info[2][0]`
    pub const USER_UID: usize = 0;
    /// `info[2][1]`
    pub const USER_NAME: usize = 1;
    /// `info[2][2]`
    pub const USER_ROOM_ADMIN: usize = 2;
    /// `info[2][5]`
    pub const USER_GUARD_RANK: usize = 5;
    /// `info[2][6]`
    pub const USER_VERIFY: usize = 6;

    /// `info[4][0]`
    pub const LEVEL_USER_LEVEL: usize = 0;
}

/// Chat line kind with its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "descriptor", rename_all = "lowercase")]
pub enum ChatKind {
    /// Plain text.
    Text,
    /// Emoji; carries the emoji descriptor.
    Emoji(Value),
    /// Voice; carries the voice descriptor.
    Voice(Value),
}

impl ChatKind {
    /// Raw discriminator value.
    pub fn code(&self) -> i64 {
        match self {
            Self::Text => 0,
            Self::Emoji(_) => 1,
            Self::Voice(_) => 2,
        }
    }
}

/// Anti-spam check attached to every chat line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckInfo {
    /// Server timestamp (seconds).
    pub ts: i64,
    /// Check token.
    pub ct: String,
}

/// One decoded chat line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    /// Display mode (scrolling, top, bottom...).
    pub mode: i64,
    /// Font size.
    pub font_size: i64,
    /// RGB color as an integer.
    pub color: i64,
    /// Local time at which the line was decoded.
    pub timestamp: DateTime<Local>,
    /// Server-side chat id.
    pub dan_mu_id: i64,
    /// Chat text.
    pub text: String,
    /// Sender uid.
    pub uid: i64,
    /// Sender display name.
    pub username: String,
    /// Sender level.
    pub user_level: i64,
    /// Guard (membership) rank.
    pub guard_rank: i64,
    /// Verification flag.
    pub verify_flag: i64,
    /// Room admin flag.
    pub room_admin_flag: i64,
    /// Kind and kind-specific payload.
    pub kind: ChatKind,
    /// Extra emoji options (`info[0][13]`), `Null` when absent.
    pub emoticon_options: Value,
    /// Mode info object, `Null` when absent.
    pub mode_info: Value,
    /// Anti-spam check, when present.
    pub check_info: Option<CheckInfo>,
}

impl ChatMessage {
    /// Decode from the command's `info` array.
    ///
    /// Returns `Ok(None)` when the kind discriminator is not one of
    /// text/emoji/voice, so the caller can pass the command through.
    ///
    /// # Errors
    ///
    /// `MessageShape` if the metadata, text or user slots are missing or
    /// have the wrong JSON type.
    pub fn from_info(info: &Value) -> Result<Option<Self>> {
        let meta = slot(info, layout::META)
            .and_then(Value::as_array)
            .ok_or_else(|| shape("info[0] is not an array"))?;
        let text = slot(info, layout::TEXT)
            .and_then(Value::as_str)
            .ok_or_else(|| shape("info[1] is not a string"))?;
        let user = slot(info, layout::USER)
            .and_then(Value::as_array)
            .ok_or_else(|| shape("info[2] is not an array"))?;

        let kind = match int_at(meta, layout::META_KIND) {
            0 => ChatKind::Text,
            1 => ChatKind::Emoji(value_at(meta, layout::META_EMOJI)),
            2 => ChatKind::Voice(value_at(meta, layout::META_VOICE)),
            other => {
                tracing::debug!(kind = other, "Unrecognized chat kind");
                return Ok(None);
            }
        };

        let user_level = slot(info, layout::LEVEL)
            .and_then(Value::as_array)
            .map(|level| int_at(level, layout::LEVEL_USER_LEVEL))
            .unwrap_or_default();

        let check_info = slot(info, layout::CHECK_INFO).and_then(|check| {
            Some(CheckInfo {
                ts: check.get("ts")?.as_i64()?,
                ct: check.get("ct")?.as_str()?.to_string(),
            })
        });

        Ok(Some(Self {
            mode: int_at(meta, layout::META_MODE),
            font_size: int_at(meta, layout::META_FONT_SIZE),
            color: int_at(meta, layout::META_COLOR),
            timestamp: Local::now(),
            dan_mu_id: int_at(meta, layout::META_DAN_MU_ID),
            text: text.to_string(),
            uid: int_at(user, layout::USER_UID),
            username: user
                .get(layout::USER_NAME)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            user_level,
            guard_rank: int_at(user, layout::USER_GUARD_RANK),
            verify_flag: int_at(user, layout::USER_VERIFY),
            room_admin_flag: int_at(user, layout::USER_ROOM_ADMIN),
            kind,
            emoticon_options: value_at(meta, layout::META_EMOTICON_OPTIONS),
            mode_info: value_at(meta, layout::META_MODE_INFO),
            check_info,
        }))
    }
}

fn slot(info: &Value, index: usize) -> Option<&Value> {
    info.as_array()?.get(index)
}

fn value_at(items: &[Value], index: usize) -> Value {
    items.get(index).cloned().unwrap_or(Value::Null)
}

/// Integer at `index`; numeric strings and booleans are accepted, anything else is 0.
fn int_at(items: &[Value], index: usize) -> i64 {
    match items.get(index) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        Some(Value::Bool(b)) => i64::from(*b),
        _ => 0,
    }
}

fn shape(reason: &str) -> DanmakuError {
    DanmakuError::MessageShape(format!("DANMU_MSG {}", reason))
}
