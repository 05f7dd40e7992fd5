//! In-memory transport for tests and offline replay.
//!
//! [`memory_pair`] returns the session side ([`MemoryTransport`]) and the
//! relay side ([`MemoryPeer`]). Buffers pushed by the peer are received by
//! the session; frames sent by the session are readable from the peer.
//! Dropping the peer ends the stream.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::{Connector, Transport};
use crate::error::{DanmakuError, Result};

/// Create a connected transport/peer pair.
pub fn memory_pair() -> (MemoryTransport, MemoryPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let closed = CancellationToken::new();

    let transport = MemoryTransport {
        inbound: Mutex::new(inbound_rx),
        outbound: outbound_tx,
        closed: closed.clone(),
    };
    let peer = MemoryPeer {
        inbound: inbound_tx,
        outbound: outbound_rx,
        closed,
    };
    (transport, peer)
}

/// Session side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryTransport {
    inbound: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    outbound: mpsc::UnboundedSender<Bytes>,
    closed: CancellationToken,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, data: Bytes) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(DanmakuError::ConnectionClosed);
        }
        self.outbound
            .send(data)
            .map_err(|_| DanmakuError::ConnectionClosed)
    }

    async fn recv(&self) -> Result<Option<Bytes>> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            () = self.closed.cancelled() => Ok(None),
            next = inbound.recv() => Ok(next),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.cancel();
        Ok(())
    }
}

/// Relay side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    inbound: mpsc::UnboundedSender<Bytes>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
    closed: CancellationToken,
}

impl MemoryPeer {
    /// Deliver a buffer to the session.
    pub fn push(&self, data: impl Into<Bytes>) -> Result<()> {
        self.inbound
            .send(data.into())
            .map_err(|_| DanmakuError::ConnectionClosed)
    }

    /// Wait for the next frame sent by the session.
    pub async fn next_sent(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    /// Take every frame sent so far without waiting.
    pub fn drain_sent(&mut self) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Whether the session closed its side.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Hands out a single pre-built [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryConnector {
    transport: StdMutex<Option<MemoryTransport>>,
}

impl MemoryConnector {
    /// Connector that yields `transport` on the first `open`.
    pub fn new(transport: MemoryTransport) -> Self {
        Self {
            transport: StdMutex::new(Some(transport)),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, url: &str) -> Result<Arc<dyn Transport>> {
        let transport = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| DanmakuError::Transport(format!("{}: already opened", url)))?;
        Ok(Arc::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_moves_buffers_both_ways() {
        let (transport, mut peer) = memory_pair();

        peer.push(Bytes::from_static(b"in")).unwrap();
        assert_eq!(transport.recv().await.unwrap().as_deref(), Some(&b"in"[..]));

        transport.send(Bytes::from_static(b"out")).await.unwrap();
        assert_eq!(peer.next_sent().await.as_deref(), Some(&b"out"[..]));
    }

    #[tokio::test]
    async fn test_dropping_peer_ends_stream() {
        let (transport, peer) = memory_pair();
        drop(peer);
        assert!(transport.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_unblocks_recv() {
        let (transport, peer) = memory_pair();
        let transport = Arc::new(transport);

        let reader = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.recv().await })
        };
        tokio::task::yield_now().await;
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        assert!(reader.await.unwrap().unwrap().is_none());
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn test_connector_opens_once() {
        let (transport, _peer) = memory_pair();
        let connector = MemoryConnector::new(transport);
        assert!(connector.open("mem://a").await.is_ok());
        assert!(matches!(
            connector.open("mem://a").await,
            Err(DanmakuError::Transport(_))
        ));
    }
}
