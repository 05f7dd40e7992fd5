//! Gift (`SEND_GIFT`) decoding.

use serde::{Deserialize, Serialize};

/// A gift sent in the room, from the command's `data` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftMessage {
    /// Sender uid.
    #[serde(default)]
    pub uid: i64,
    /// Sender display name.
    #[serde(rename = "uname", default)]
    pub username: String,
    /// Gift id.
    #[serde(rename = "giftId", default)]
    pub gift_id: i64,
    /// Gift display name.
    #[serde(rename = "giftName", default)]
    pub gift_name: String,
    /// Number of gifts sent.
    #[serde(default)]
    pub num: i64,
    /// Unit price in the gift's coin type.
    #[serde(default)]
    pub price: i64,
    /// `gold` or `silver`.
    #[serde(default)]
    pub coin_type: String,
    /// Action verb shown next to the gift.
    #[serde(default)]
    pub action: String,
    /// Server timestamp (seconds).
    #[serde(default)]
    pub timestamp: i64,
}
