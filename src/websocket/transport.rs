//! Transport abstraction the send loop writes to.
//!
//! A connection is a pair of halves: a [`FrameSink`] that accepts outbound
//! frames and an [`InboundStream`] reporting what the peer does. The
//! WebSocket implementation splits an axum socket into the two.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{BoxStream, SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;

use super::OutboundFrame;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport write failed: {0}")]
    Write(String),

    #[error("transport write timed out")]
    Timeout,
}

/// Something the peer did on the inbound half
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Any frame that proves the peer is alive
    Activity,
    /// Close frame
    Close,
    /// Read failed
    Error(String),
}

/// Inbound half; the stream ending means the peer went away
pub type InboundStream = BoxStream<'static, InboundEvent>;

#[async_trait]
pub trait FrameSink: Send + 'static {
    async fn send_frame(&mut self, frame: OutboundFrame) -> Result<(), TransportError>;

    /// Close the transport. Called once, when the send loop exits.
    async fn close(&mut self);
}

/// Outbound half of an axum WebSocket
pub struct WebSocketSink {
    inner: SplitSink<WebSocket, Message>,
}

impl WebSocketSink {
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_frame(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        let message = match frame {
            OutboundFrame::Text(text) => Message::Text(text),
            OutboundFrame::Ping => Message::Ping(Bytes::new()),
        };
        self.inner
            .send(message)
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.close().await {
            tracing::debug!(error = %e, "WebSocket close did not complete cleanly");
        }
    }
}

/// Map the receiving half of a WebSocket into inbound events
pub fn websocket_inbound(stream: SplitStream<WebSocket>) -> InboundStream {
    stream
        .map(|result| match result {
            Ok(Message::Close(_)) => InboundEvent::Close,
            Ok(_) => InboundEvent::Activity,
            Err(e) => InboundEvent::Error(e.to_string()),
        })
        .boxed()
}
