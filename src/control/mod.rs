//! Control module - everything needed before the receive loop starts.
//!
//! - [`RoomInfoClient`] resolves a room id into a relay URL and token
//! - [`AuthBody`] / [`check_auth_reply`] implement the auth handshake
//!
//! # Workflow
//!
//! 1. Look up connection parameters for the room (HTTP)
//! 2. Open the transport to `host_list[0]`
//! 3. Send the auth frame
//! 4. Read one reply and check it before entering the receive loop
//!
//! # Example
//!
//! ```ignore
//! use danmaku_client::control::RoomInfoClient;
//!
//! let info = RoomInfoClient::new().fetch(23219374).await?;
//! let params = info.connection_params()?;
//! println!("connecting to {}", params.url);
//! ```

mod auth;
mod room_info;

pub use auth::{
    build_auth_frame, check_auth_reply, AuthBody, AUTH_OK, AUTH_TOKEN_ERROR, DEFAULT_PLATFORM,
    DEFAULT_PROTOVER,
};
pub use room_info::{
    ConnectionParams, HostInfo, RoomInfo, RoomInfoClient, RoomInfoData, DEFAULT_API_BASE,
    ROOM_INFO_PATH,
};
