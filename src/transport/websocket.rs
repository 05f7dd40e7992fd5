//! WebSocket transport over `tokio-tungstenite`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{Connector, Transport};
use crate::error::{DanmakuError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Opens [`WebSocketTransport`]s (ws:// or wss://, rustls with webpki roots).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<Arc<dyn Transport>> {
        let transport = WebSocketTransport::connect(url).await?;
        Ok(Arc::new(transport))
    }
}

/// One WebSocket connection split into independently locked halves.
#[derive(Debug)]
pub struct WebSocketTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    closed: AtomicBool,
}

impl WebSocketTransport {
    /// Perform the WebSocket handshake against `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        tracing::debug!(%url, "Opening WebSocket");
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| DanmakuError::Transport(format!("connect {}: {}", url, e)))?;
        let (sink, stream) = ws.split();

        Ok(Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, data: Bytes) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DanmakuError::ConnectionClosed);
        }
        self.sink
            .lock()
            .await
            .send(Message::Binary(data.to_vec()))
            .await
            .map_err(|e| DanmakuError::Transport(format!("send failed: {}", e)))
    }

    async fn recv(&self) -> Result<Option<Bytes>> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(Bytes::from(data))),
                Some(Ok(Message::Text(text))) => return Ok(Some(Bytes::from(text.into_bytes()))),
                // Pings are answered by tungstenite on the next write.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        tracing::debug!(code = u16::from(frame.code), reason = %frame.reason, "WebSocket closed by peer");
                    }
                    return Ok(None);
                }
                Some(Err(e)) => {
                    if self.closed.load(Ordering::Acquire) {
                        return Ok(None);
                    }
                    return Err(DanmakuError::Transport(format!("receive failed: {}", e)));
                }
                None => return Ok(None),
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut sink = self.sink.lock().await;
        // Peer may already be gone; closing is best effort.
        if let Err(e) = sink.send(Message::Close(None)).await {
            tracing::debug!("Close frame not sent: {}", e);
        }
        if let Err(e) = sink.close().await {
            tracing::debug!("Sink close failed: {}", e);
        }
        Ok(())
    }
}
