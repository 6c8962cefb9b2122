use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocket;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::hub::{ConnectionHandle, ConnectionId, ConnectionState, EvictReason, Hub};
use crate::metrics::HubMetrics;

use super::transport::{
    websocket_inbound, FrameSink, InboundEvent, InboundStream, TransportError, WebSocketSink,
};
use super::OutboundFrame;

/// A handshaked duplex connection that has not been admitted yet
pub struct Connection {
    id: ConnectionId,
    sink: Box<dyn FrameSink>,
    inbound: InboundStream,
}

impl Connection {
    pub fn new(id: ConnectionId, sink: impl FrameSink, inbound: InboundStream) -> Self {
        Self {
            id,
            sink: Box::new(sink),
            inbound,
        }
    }

    /// Wrap an upgraded axum WebSocket
    pub fn from_websocket(id: ConnectionId, socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self::new(id, WebSocketSink::new(sink), websocket_inbound(stream))
    }

    pub(crate) fn into_parts(self) -> (ConnectionId, Box<dyn FrameSink>, InboundStream) {
        (self.id, self.sink, self.inbound)
    }
}

enum LoopExit {
    CloseRequested,
    WriteFailed(TransportError),
    PeerClosed,
    ReadFailed(String),
}

/// Drains one connection's outbound queue onto its transport
pub(crate) struct SendLoop {
    pub hub: Arc<Hub>,
    pub handle: Arc<ConnectionHandle>,
    pub rx: mpsc::Receiver<OutboundFrame>,
    pub sink: Box<dyn FrameSink>,
    pub inbound: InboundStream,
    pub write_timeout: Duration,
}

impl SendLoop {
    pub async fn run(self) {
        let SendLoop {
            hub,
            handle,
            mut rx,
            mut sink,
            mut inbound,
            write_timeout,
        } = self;

        let exit = loop {
            tokio::select! {
                biased;
                _ = handle.closed() => break LoopExit::CloseRequested,
                frame = rx.recv() => {
                    let Some(frame) = frame else {
                        break LoopExit::CloseRequested;
                    };
                    if let Err(e) = write_frame(sink.as_mut(), frame, write_timeout).await {
                        break LoopExit::WriteFailed(e);
                    }
                }
                event = inbound.next() => match event {
                    Some(InboundEvent::Activity) => handle.update_activity(),
                    Some(InboundEvent::Close) | None => break LoopExit::PeerClosed,
                    Some(InboundEvent::Error(e)) => break LoopExit::ReadFailed(e),
                },
            }
        };

        let reason = match exit {
            LoopExit::CloseRequested => None,
            LoopExit::WriteFailed(e) => {
                tracing::warn!(connection_id = %handle.id, error = %e, "Write failed, evicting connection");
                Some(EvictReason::WriteFailed)
            }
            LoopExit::PeerClosed => {
                tracing::debug!(connection_id = %handle.id, "Peer closed connection");
                Some(EvictReason::PeerClosed)
            }
            LoopExit::ReadFailed(e) => {
                tracing::debug!(connection_id = %handle.id, error = %e, "Read failed, evicting connection");
                Some(EvictReason::ReadFailed)
            }
        };
        if let Some(reason) = reason {
            hub.evict_instance(&handle.id, handle.serial, reason).await;
        }

        // Queued frames are abandoned once the loop stops
        handle.set_state(ConnectionState::Draining);
        rx.close();
        close_sink(sink.as_mut(), write_timeout).await;
        handle.set_state(ConnectionState::Closed);
        hub.transport_closed();

        let duration = (Utc::now() - handle.connected_at).num_milliseconds() as f64 / 1000.0;
        HubMetrics::observe_connection_duration(duration);
        tracing::info!(
            connection_id = %handle.id,
            duration_secs = duration,
            "Connection closed"
        );
    }
}

async fn write_frame(
    sink: &mut dyn FrameSink,
    frame: OutboundFrame,
    write_timeout: Duration,
) -> Result<(), TransportError> {
    match tokio::time::timeout(write_timeout, sink.send_frame(frame)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout),
    }
}

/// Close a transport without letting a stalled peer hold the caller
pub(crate) async fn close_sink(sink: &mut dyn FrameSink, close_timeout: Duration) {
    if tokio::time::timeout(close_timeout, sink.close()).await.is_err() {
        tracing::debug!("Transport close timed out");
    }
}
