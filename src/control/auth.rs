//! Auth handshake frame and reply check.
//!
//! The auth frame is the first frame sent on a fresh connection:
//!
//! ```json
//! {"uid":0,"roomid":23219374,"protover":3,"platform":"web","type":2,"key":"<token>"}
//! ```
//!
//! The server answers with a `ConnectSuccess` frame whose body is
//! `{"code":0}` on success or `{"code":-101}` when the token is rejected.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::JsonCodec;
use crate::error::{DanmakuError, Result};
use crate::protocol::{encode, Frame, Operation};

/// Reply code for an accepted auth frame.
pub const AUTH_OK: i64 = 0;

/// Reply code for a rejected token.
pub const AUTH_TOKEN_ERROR: i64 = -101;

/// Body protocol requested in the auth frame (3 = brotli).
pub const DEFAULT_PROTOVER: u16 = 3;

/// Platform tag sent in the auth frame.
pub const DEFAULT_PLATFORM: &str = "web";

/// Client type sent in the auth frame.
const CLIENT_TYPE: u8 = 2;

/// JSON body of the auth frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthBody {
    /// User id (0 = anonymous).
    pub uid: u64,
    /// Room to join.
    pub roomid: u64,
    /// Requested body protocol.
    pub protover: u16,
    /// Platform tag.
    pub platform: String,
    /// Client type.
    #[serde(rename = "type")]
    pub client_type: u8,
    /// Token from the connection-parameter lookup.
    pub key: String,
}

impl AuthBody {
    /// Auth body with default protover, platform and client type.
    pub fn new(uid: u64, roomid: u64, key: impl Into<String>) -> Self {
        Self {
            uid,
            roomid,
            protover: DEFAULT_PROTOVER,
            platform: DEFAULT_PLATFORM.to_string(),
            client_type: CLIENT_TYPE,
            key: key.into(),
        }
    }
}

/// Encode the auth frame for `body`.
pub fn build_auth_frame(body: &AuthBody) -> Result<Bytes> {
    let json = JsonCodec::encode(body)?;
    Ok(encode(&json, Operation::UserAuthentication))
}

#[derive(Deserialize)]
struct AuthReplyBody {
    code: i64,
}

/// Check the first frame received after the auth frame.
///
/// A `ConnectSuccess` with a non-zero `code` is a rejection. Any other
/// well-formed frame (commonly a heartbeat reply) is accepted and discarded.
///
/// # Errors
///
/// `MalformedHeader` for an unparseable frame, `AuthenticationRejected` for a
/// non-zero reply code.
pub fn check_auth_reply(buf: &[u8]) -> Result<()> {
    let frame = Frame::parse(buf)?;

    match frame.op() {
        Some(Operation::ConnectSuccess) => {
            if frame.body().is_empty() {
                return Ok(());
            }
            match JsonCodec::decode::<AuthReplyBody>(frame.body()) {
                Ok(reply) if reply.code == AUTH_OK => Ok(()),
                Ok(reply) => Err(DanmakuError::AuthenticationRejected { code: reply.code }),
                Err(e) => {
                    tracing::warn!("Unreadable connect-success body, accepting: {}", e);
                    Ok(())
                }
            }
        }
        op => {
            tracing::debug!(?op, "Discarding first reply");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Header;

    #[test]
    fn test_auth_body_json() {
        let body = AuthBody::new(0, 23219374, "tok");
        let json = String::from_utf8(JsonCodec::encode(&body).unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"uid":0,"roomid":23219374,"protover":3,"platform":"web","type":2,"key":"tok"}"#
        );
    }

    #[test]
    fn test_build_auth_frame() {
        let bytes = build_auth_frame(&AuthBody::new(1, 2, "k")).unwrap();
        let frame = Frame::parse(&bytes).unwrap();
        assert_eq!(frame.op(), Some(Operation::UserAuthentication));
        let value: serde_json::Value = JsonCodec::decode(frame.body()).unwrap();
        assert_eq!(value["roomid"], 2);
        assert_eq!(value["key"], "k");
    }

    #[test]
    fn test_reply_ok() {
        let reply = encode(br#"{"code":0}"#, Operation::ConnectSuccess);
        assert!(check_auth_reply(&reply).is_ok());
    }

    #[test]
    fn test_reply_empty_body() {
        let reply = encode(b"", Operation::ConnectSuccess);
        assert!(check_auth_reply(&reply).is_ok());
    }

    #[test]
    fn test_reply_token_error() {
        let reply = encode(br#"{"code":-101}"#, Operation::ConnectSuccess);
        match check_auth_reply(&reply) {
            Err(DanmakuError::AuthenticationRejected { code }) => {
                assert_eq!(code, AUTH_TOKEN_ERROR)
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_reply_heartbeat_accepted() {
        let reply = encode(&3u32.to_be_bytes(), Operation::HeartbeatReply);
        assert!(check_auth_reply(&reply).is_ok());
    }

    #[test]
    fn test_reply_malformed() {
        let mut reply = Header::new(Operation::ConnectSuccess, 0).encode();
        reply[4..6].copy_from_slice(&0u16.to_be_bytes());
        assert!(matches!(
            check_auth_reply(&reply),
            Err(DanmakuError::MalformedHeader(_))
        ));
    }
}
