//! `cmd` discriminator of pushed JSON commands.

use std::fmt;

/// Known command kinds; everything else is carried by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// `DANMU_MSG` - a chat line.
    Danmaku,
    /// `SEND_GIFT` - a gift was sent.
    SendGift,
    /// `LIVE` - the room went live.
    Live,
    /// `PREPARING` - the room stopped broadcasting.
    Preparing,
    /// Any other command, by its base name.
    Other(String),
}

impl Command {
    /// Parse a `cmd` string.
    ///
    /// The server sometimes appends `:`-separated options
    /// (`DANMU_MSG:4:0:2:2:2:0`); only the part before the first `:` counts.
    pub fn parse(cmd: &str) -> Self {
        let base = cmd.split(':').next().unwrap_or(cmd);
        match base {
            "DANMU_MSG" => Self::Danmaku,
            "SEND_GIFT" => Self::SendGift,
            "LIVE" => Self::Live,
            "PREPARING" => Self::Preparing,
            other => Self::Other(other.to_string()),
        }
    }

    /// Base command name as sent on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Danmaku => "DANMU_MSG",
            Self::SendGift => "SEND_GIFT",
            Self::Live => "LIVE",
            Self::Preparing => "PREPARING",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
