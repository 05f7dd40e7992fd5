//! Serialized frame sending.
//!
//! The heartbeat task and caller-initiated sends share one transport. The
//! transport is not assumed safe for unsynchronized concurrent writes, so
//! every outbound frame goes through a [`FrameWriter`], which holds a single
//! send lock around `Transport::send`.
//!
//! ```text
//! Heartbeat task ─┐
//! Session::send  ─┼─► FrameWriter (send lock) ─► Transport
//! Auth handshake ─┘
//! ```

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::codec::JsonCodec;
use crate::error::Result;
use crate::protocol::{encode, Operation};
use crate::transport::Transport;

/// Handle for sending frames on a shared transport.
///
/// Cheaply cloneable; all clones share the same send lock.
#[derive(Clone)]
pub struct FrameWriter {
    transport: Arc<dyn Transport>,
    send_lock: Arc<Mutex<()>>,
}

impl FrameWriter {
    /// Wrap a transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            send_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Encode `body` under `op` and send it.
    pub async fn send_frame(&self, op: Operation, body: &[u8]) -> Result<()> {
        self.send_raw(encode(body, op)).await
    }

    /// Serialize `value` as JSON and send it under `op`.
    pub async fn send_json<T: Serialize>(&self, op: Operation, value: &T) -> Result<()> {
        let body = JsonCodec::encode(value)?;
        self.send_frame(op, &body).await
    }

    /// Send an already-encoded frame.
    pub async fn send_raw(&self, frame: Bytes) -> Result<()> {
        let _guard = self.send_lock.lock().await;
        tracing::trace!(len = frame.len(), "Sending frame");
        self.transport.send(frame).await
    }

    /// Underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter").finish_non_exhaustive()
    }
}
