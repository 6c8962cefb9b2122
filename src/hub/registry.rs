use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

use crate::metrics::HubMetrics;
use crate::websocket::{close_sink, Connection, EventEnvelope, OutboundFrame, SendLoop};

use super::stats::{BroadcastReport, HubCounters, HubStats};
use super::types::{
    BackpressurePolicy, ConnectionHandle, ConnectionId, ConnectionState, EnqueueOutcome,
    EvictReason, HubConfig, HubError,
};

/// Everything guarded by the hub lock
struct LiveSet {
    connections: HashMap<ConnectionId, Arc<ConnectionHandle>>,
    accepting: bool,
}

/// Registry of live connections and broadcaster
///
/// Admission, eviction and the enqueue pass of a broadcast all go through
/// one `RwLock`. Broadcasts hold the read side and only ever `try_send`, so
/// a slow connection can never hold the lock.
pub struct Hub {
    live: RwLock<LiveSet>,
    config: HubConfig,
    next_serial: AtomicU64,
    open_transports: AtomicUsize,
    counters: HubCounters,
}

impl Hub {
    /// Empty hub that accepts admissions
    pub fn new(config: HubConfig) -> Self {
        Self {
            live: RwLock::new(LiveSet {
                connections: HashMap::new(),
                accepting: true,
            }),
            config,
            next_serial: AtomicU64::new(0),
            open_transports: AtomicUsize::new(0),
            counters: HubCounters::default(),
        }
    }

    /// Admit a handshaked connection and start its send loop
    ///
    /// The connection is a broadcast target once this returns. A rejected
    /// connection has its transport closed in the background.
    pub async fn admit(self: &Arc<Self>, connection: Connection) -> Result<ConnectionId, HubError> {
        let (id, mut sink, inbound) = connection.into_parts();
        let (tx, rx) = mpsc::channel(self.config.outbound_queue_capacity.max(1));
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(ConnectionHandle::new(id.clone(), serial, tx));

        let admitted = {
            let mut live = self.live.write().await;
            if !live.accepting {
                Err(HubError::ShuttingDown)
            } else if live.connections.contains_key(&id) {
                Err(HubError::DuplicateIdentity(id.clone()))
            } else {
                handle.set_state(ConnectionState::Live);
                live.connections.insert(id.clone(), handle.clone());
                self.open_transports.fetch_add(1, Ordering::AcqRel);
                Ok(live.connections.len())
            }
        };

        let live_count = match admitted {
            Ok(count) => count,
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                HubMetrics::record_rejected(&e);
                tracing::warn!(connection_id = %id, error = %e, "Connection rejected");
                // Admission never waits on the peer
                let close_timeout = self.config.write_timeout;
                tokio::spawn(async move { close_sink(sink.as_mut(), close_timeout).await });
                return Err(e);
            }
        };

        tokio::spawn(
            SendLoop {
                hub: self.clone(),
                handle,
                rx,
                sink,
                inbound,
                write_timeout: self.config.write_timeout,
            }
            .run(),
        );

        self.counters.admitted.fetch_add(1, Ordering::Relaxed);
        HubMetrics::record_admitted(live_count);
        tracing::info!(connection_id = %id, live_connections = live_count, "Connection admitted");

        Ok(id)
    }

    /// Remove a connection and signal its send loop to close the transport
    ///
    /// Returns `false` if the id was not live; calling it again is a no-op.
    pub async fn evict(&self, id: &ConnectionId) -> bool {
        self.remove(id, None, EvictReason::Requested).await
    }

    /// Eviction on behalf of one specific admission
    ///
    /// A send loop uses this for itself so it cannot evict a newer
    /// connection that reused its id.
    pub(crate) async fn evict_instance(
        &self,
        id: &ConnectionId,
        serial: u64,
        reason: EvictReason,
    ) -> bool {
        self.remove(id, Some(serial), reason).await
    }

    async fn remove(&self, id: &ConnectionId, serial: Option<u64>, reason: EvictReason) -> bool {
        let (removed, live_count) = {
            let mut live = self.live.write().await;
            let matches = match (live.connections.get(id), serial) {
                (Some(handle), Some(serial)) => handle.serial == serial,
                (Some(_), None) => true,
                (None, _) => false,
            };
            let removed = if matches {
                live.connections.remove(id)
            } else {
                None
            };
            (removed, live.connections.len())
        };

        let Some(handle) = removed else {
            return false;
        };

        handle.request_close();
        self.counters.evicted.fetch_add(1, Ordering::Relaxed);
        HubMetrics::record_evicted(reason, live_count);
        tracing::info!(
            connection_id = %id,
            reason = reason.as_str(),
            live_connections = live_count,
            "Connection evicted"
        );
        true
    }

    /// Serialize an event once and offer it to every live connection except `exclude`
    ///
    /// Never waits for delivery. Full queues are handled per the configured
    /// [`BackpressurePolicy`]; nothing here fails the caller.
    #[tracing::instrument(name = "hub.broadcast", skip_all, fields(kind = %kind))]
    pub async fn broadcast<T: Serialize + ?Sized>(
        &self,
        kind: &str,
        payload: &T,
        exclude: Option<&ConnectionId>,
    ) -> BroadcastReport {
        let frame = match EventEnvelope::new(kind, payload).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(kind = %kind, error = %e, "Failed to serialize event");
                return BroadcastReport::default();
            }
        };

        let report = self.fan_out(frame, exclude).await;

        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.counters.record_report(&report);
        HubMetrics::record_broadcast(&report);
        tracing::debug!(
            kind = %kind,
            excluded = ?exclude.map(ConnectionId::as_str),
            recipients = report.recipients,
            dropped = report.dropped,
            evicted = report.evicted,
            "Broadcast event"
        );

        report
    }

    /// Queue a keepalive ping on every live connection
    pub async fn ping_all(&self) -> BroadcastReport {
        self.fan_out(OutboundFrame::Ping, None).await
    }

    async fn fan_out(&self, frame: OutboundFrame, exclude: Option<&ConnectionId>) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut to_evict = Vec::new();

        {
            let live = self.live.read().await;
            for handle in live.connections.values() {
                if exclude == Some(&handle.id) {
                    continue;
                }
                match handle.try_enqueue(frame.clone()) {
                    EnqueueOutcome::Queued => report.recipients += 1,
                    EnqueueOutcome::Saturated => {
                        report.dropped += 1;
                        tracing::debug!(
                            connection_id = %handle.id,
                            total_dropped = handle.dropped_frames(),
                            "Outbound queue full"
                        );
                        if self.config.backpressure == BackpressurePolicy::Evict {
                            to_evict.push((handle.id.clone(), handle.serial, EvictReason::QueueSaturated));
                        }
                    }
                    EnqueueOutcome::Closed => {
                        to_evict.push((handle.id.clone(), handle.serial, EvictReason::QueueClosed));
                    }
                }
            }
        }

        for (id, serial, reason) in to_evict {
            if self.remove(&id, Some(serial), reason).await {
                report.evicted += 1;
            }
        }

        report
    }

    /// Evict connections with no inbound activity for longer than `timeout`
    pub async fn evict_idle(&self, timeout: Duration) -> usize {
        let now = Utc::now();
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);

        let stale: Vec<(ConnectionId, u64)> = {
            let live = self.live.read().await;
            live.connections
                .values()
                .filter(|handle| now.signed_duration_since(handle.last_activity()) > timeout)
                .map(|handle| (handle.id.clone(), handle.serial))
                .collect()
        };

        let mut removed = 0;
        for (id, serial) in stale {
            if self.remove(&id, Some(serial), EvictReason::Idle).await {
                removed += 1;
            }
        }
        removed
    }

    /// Stop admitting and signal every send loop to close
    ///
    /// Returns the number of connections that were live.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Arc<ConnectionHandle>> = {
            let mut live = self.live.write().await;
            live.accepting = false;
            live.connections.drain().map(|(_, handle)| handle).collect()
        };

        for handle in &drained {
            handle.request_close();
            HubMetrics::record_evicted(EvictReason::Shutdown, 0);
        }
        self.counters
            .evicted
            .fetch_add(drained.len() as u64, Ordering::Relaxed);

        tracing::info!(signalled = drained.len(), "Hub stopped accepting connections");
        drained.len()
    }

    pub(crate) fn transport_closed(&self) {
        self.open_transports.fetch_sub(1, Ordering::AcqRel);
    }

    /// Send loops that have not released their transport yet
    pub fn open_transports(&self) -> usize {
        self.open_transports.load(Ordering::Acquire)
    }

    pub async fn len(&self) -> usize {
        self.live.read().await.connections.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.live.read().await.connections.is_empty()
    }

    pub async fn is_accepting(&self) -> bool {
        self.live.read().await.accepting
    }

    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.live.read().await.connections.contains_key(id)
    }

    pub async fn connection(&self, id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.live.read().await.connections.get(id).cloned()
    }

    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        self.live.read().await.connections.keys().cloned().collect()
    }

    pub async fn stats(&self) -> HubStats {
        let (live_connections, accepting) = {
            let live = self.live.read().await;
            (live.connections.len(), live.accepting)
        };

        HubStats {
            live_connections,
            accepting,
            open_transports: self.open_transports(),
            total_admitted: self.counters.admitted.load(Ordering::Relaxed),
            total_rejected: self.counters.rejected.load(Ordering::Relaxed),
            total_evicted: self.counters.evicted.load(Ordering::Relaxed),
            total_broadcasts: self.counters.broadcasts.load(Ordering::Relaxed),
            frames_queued: self.counters.frames_queued.load(Ordering::Relaxed),
            frames_dropped: self.counters.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
