//! Error types for danmaku-client.

use thiserror::Error;

use crate::handler::EventKind;
use crate::session::SessionState;

/// Main error type for all danmaku-client operations.
#[derive(Debug, Error)]
pub enum DanmakuError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame header is too short or declares a header size other than 16.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// Compressed body could not be expanded.
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Body protocol version with no decode path (e.g. the reserved zlib tag).
    #[error("Unsupported body protocol version: {0}")]
    UnsupportedProtocolVersion(u16),

    /// Server refused the auth frame.
    #[error("Authentication rejected (code {code})")]
    AuthenticationRejected {
        /// Code reported by the server (-101 = token error).
        code: i64,
    },

    /// No reply to the auth frame within the configured timeout.
    #[error("Authentication timed out")]
    AuthenticationTimeout,

    /// A pushed command did not have the expected JSON shape.
    #[error("Unexpected message shape: {0}")]
    MessageShape(String),

    /// Connection-parameter lookup failed.
    #[error("Connection info unavailable: {0}")]
    ConnectionInfoUnavailable(String),

    /// The same listener is already registered for this event kind.
    #[error("Listener already registered for {0}")]
    DuplicateListener(EventKind),

    /// The listener is not registered for this event kind.
    #[error("Listener not registered for {0}")]
    UnknownListener(EventKind),

    /// Transport-level failure (open, send or receive).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation not valid in the session's current state.
    #[error("Invalid session state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        /// State the operation requires.
        expected: SessionState,
        /// State the session was in.
        actual: SessionState,
    },

    /// A listener reported a failure.
    #[error("Listener error: {0}")]
    Listener(String),
}

/// Result type alias using DanmakuError.
pub type Result<T> = std::result::Result<T, DanmakuError>;
