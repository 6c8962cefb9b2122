use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::hub::Hub;
use crate::metrics::HeartbeatMetrics;

/// Background task for heartbeat and idle connection cleanup
pub struct HeartbeatTask {
    config: WebSocketConfig,
    hub: Arc<Hub>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(config: WebSocketConfig, hub: Arc<Hub>, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            config,
            hub,
            shutdown,
        }
    }

    /// Run the heartbeat and cleanup timers until shutdown is signalled
    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval.max(1));
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval.max(1));
        let connection_timeout = Duration::from_secs(self.config.connection_timeout);

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = self.config.connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats().await;
                }
                _ = cleanup_timer.tick() => {
                    self.cleanup_idle_connections(connection_timeout).await;
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Queue a ping on every live connection
    async fn send_heartbeats(&self) {
        let start = Instant::now();
        let report = self.hub.ping_all().await;
        HeartbeatMetrics::record_round();

        tracing::debug!(
            queued = report.recipients,
            dropped = report.dropped,
            evicted = report.evicted,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Heartbeat round completed"
        );
    }

    async fn cleanup_idle_connections(&self, timeout: Duration) {
        let removed = self.hub.evict_idle(timeout).await;

        if removed > 0 {
            HeartbeatMetrics::record_idle_evictions(removed as u64);
            tracing::info!(
                removed = removed,
                timeout_secs = timeout.as_secs(),
                "Cleaned up idle connections"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ConnectionId;
    use crate::websocket::{Connection, FrameSink, OutboundFrame, TransportError};
    use async_trait::async_trait;
    use futures::StreamExt;

    struct NullSink;

    #[async_trait]
    impl FrameSink for NullSink {
        async fn send_frame(&mut self, _frame: OutboundFrame) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn test_idle_connections_are_evicted() {
        let hub = Arc::new(Hub::default());
        let connection = Connection::new(
            ConnectionId::from("idle"),
            NullSink,
            futures::stream::pending().boxed(),
        );
        hub.admit(connection).await.unwrap();

        let config = WebSocketConfig {
            heartbeat_interval: 1,
            cleanup_interval: 1,
            connection_timeout: 0,
            ..WebSocketConfig::default()
        };
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(HeartbeatTask::new(config, hub.clone(), rx).run());

        let mut evicted = false;
        for _ in 0..40 {
            if hub.is_empty().await {
                evicted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(evicted, "idle connection was not evicted");

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_task_stops_on_shutdown_signal() {
        let hub = Arc::new(Hub::default());
        let (tx, rx) = broadcast::channel(1);
        let task = HeartbeatTask::new(WebSocketConfig::default(), hub, rx);

        let handle = tokio::spawn(task.run());
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("heartbeat task did not stop")
            .unwrap();
    }
}
