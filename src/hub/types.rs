//! Connection handle and related types

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};

use crate::websocket::OutboundFrame;

/// Identity of a live connection, unique only while the connection is live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SocketAddr> for ConnectionId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle of a connection as observed by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    /// Handshake done, not yet admitted
    Pending = 0,
    /// Admitted and receiving broadcasts
    Live = 1,
    /// Eviction requested, send loop is winding down
    Draining = 2,
    /// Transport released
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Live,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

/// What happens to a connection whose outbound queue is full at broadcast time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Drop the frame for that connection only
    #[default]
    DropNewest,
    /// Evict the connection
    Evict,
}

/// Why a connection left the live set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    Requested,
    WriteFailed,
    ReadFailed,
    PeerClosed,
    QueueSaturated,
    QueueClosed,
    Idle,
    Shutdown,
}

impl EvictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::WriteFailed => "write_failed",
            Self::ReadFailed => "read_failed",
            Self::PeerClosed => "peer_closed",
            Self::QueueSaturated => "queue_saturated",
            Self::QueueClosed => "queue_closed",
            Self::Idle => "idle",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Errors returned by hub admission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("connection {0} is already live")]
    DuplicateIdentity(ConnectionId),

    #[error("hub is shutting down and no longer admits connections")]
    ShuttingDown,
}

/// Result of offering one frame to one connection's outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    Saturated,
    Closed,
}

/// Handle for a single admitted connection
///
/// The hub keeps one of these per live connection. The outbound queue's
/// receiving end and the transport itself belong to the send loop.
pub struct ConnectionHandle {
    pub id: ConnectionId,
    /// Distinguishes this admission from later ones reusing the same id
    pub(crate) serial: u64,
    sender: mpsc::Sender<OutboundFrame>,
    close: Notify,
    state: AtomicU8,
    pub connected_at: DateTime<Utc>,
    /// Last inbound activity (Unix millis)
    last_activity: AtomicI64,
    dropped_frames: AtomicU64,
}

impl ConnectionHandle {
    pub(crate) fn new(id: ConnectionId, serial: u64, sender: mpsc::Sender<OutboundFrame>) -> Self {
        let now = Utc::now();
        Self {
            id,
            serial,
            sender,
            close: Notify::new(),
            state: AtomicU8::new(ConnectionState::Pending as u8),
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp_millis()),
            dropped_frames: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_activity.load(Ordering::Relaxed))
            .unwrap_or_else(Utc::now)
    }

    /// Frames dropped for this connection because its queue was full
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Offer a frame without waiting for queue space
    pub(crate) fn try_enqueue(&self, frame: OutboundFrame) -> EnqueueOutcome {
        match self.sender.try_send(frame) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                EnqueueOutcome::Saturated
            }
            Err(TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }

    /// Ask the send loop to stop; queued frames are abandoned
    pub(crate) fn request_close(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Live as u8,
            ConnectionState::Draining as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        // notify_one keeps a permit if the loop is busy writing
        self.close.notify_one();
    }

    pub(crate) async fn closed(&self) {
        self.close.notified().await
    }
}

/// Hub tuning, derived from the websocket settings
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    pub outbound_queue_capacity: usize,
    pub backpressure: BackpressurePolicy,
    pub write_timeout: std::time::Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 64,
            backpressure: BackpressurePolicy::default(),
            write_timeout: std::time::Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_from_socket_addr() {
        let addr: SocketAddr = "127.0.0.1:5050".parse().unwrap();
        assert_eq!(ConnectionId::from(addr).as_str(), "127.0.0.1:5050");
    }

    #[tokio::test]
    async fn test_try_enqueue_reports_saturation_and_closure() {
        let (tx, rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(ConnectionId::from("a"), 0, tx);

        assert_eq!(handle.try_enqueue(OutboundFrame::Ping), EnqueueOutcome::Queued);
        assert_eq!(handle.try_enqueue(OutboundFrame::Ping), EnqueueOutcome::Saturated);
        assert_eq!(handle.dropped_frames(), 1);

        drop(rx);
        assert_eq!(handle.try_enqueue(OutboundFrame::Ping), EnqueueOutcome::Closed);
    }

    #[test]
    fn test_request_close_only_moves_live_to_draining() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(ConnectionId::from("a"), 0, tx);

        handle.request_close();
        assert_eq!(handle.state(), ConnectionState::Pending);

        handle.set_state(ConnectionState::Live);
        handle.request_close();
        assert_eq!(handle.state(), ConnectionState::Draining);
    }

    #[test]
    fn test_backpressure_policy_deserializes_snake_case() {
        let policy: BackpressurePolicy = serde_json::from_str("\"evict\"").unwrap();
        assert_eq!(policy, BackpressurePolicy::Evict);
        assert_eq!(BackpressurePolicy::default(), BackpressurePolicy::DropNewest);
    }
}
