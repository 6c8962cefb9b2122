//! Graceful shutdown handling for the realtime hub.
//!
//! Shutdown runs in order:
//! 1. Signal background tasks to stop
//! 2. Stop admitting connections and signal every send loop to close
//! 3. Wait (bounded) for send loops to release their transports

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::ShutdownSettings;
use crate::hub::Hub;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for transports to close (default: 10 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ShutdownSettings> for ShutdownConfig {
    fn from(settings: &ShutdownSettings) -> Self {
        Self {
            drain_timeout: Duration::from_secs(settings.drain_timeout),
        }
    }
}

/// Handles graceful shutdown of the hub
pub struct GracefulShutdown {
    hub: Arc<Hub>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(hub: Arc<Hub>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(hub, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        hub: Arc<Hub>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            hub,
            shutdown_tx,
            config,
        }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(name = "graceful_shutdown", skip(self))]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Signaling background tasks");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 2: Closing hub");
        result.connections_signalled = self.hub.shutdown().await;

        tracing::info!("Phase 3: Waiting for transports to close");
        result.transports_remaining = self.wait_for_transports().await;

        result.duration = start.elapsed();
        result.success = result.transports_remaining == 0;

        tracing::info!(
            connections_signalled = result.connections_signalled,
            transports_remaining = result.transports_remaining,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    /// Wait until every send loop has released its transport
    async fn wait_for_transports(&self) -> usize {
        let hub = self.hub.clone();
        let wait_future = async move {
            while hub.open_transports() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };

        let _ = timeout(self.config.drain_timeout, wait_future).await;

        let remaining = self.hub.open_transports();
        if remaining > 0 {
            tracing::warn!(
                remaining_transports = remaining,
                "Some transports did not close before the drain timeout"
            );
        }
        remaining
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether every transport closed in time
    pub success: bool,
    /// Connections that were live when the hub closed
    pub connections_signalled: usize,
    /// Transports still open after the drain timeout
    pub transports_remaining: usize,
    /// Total time taken for shutdown
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_no_connections() {
        let hub = Arc::new(Hub::default());
        let (tx, mut rx) = broadcast::channel(1);
        let shutdown = GracefulShutdown::new(hub.clone(), tx);

        let result = shutdown.execute("test shutdown").await;

        assert!(result.success);
        assert_eq!(result.connections_signalled, 0);
        assert!(rx.try_recv().is_ok());
        assert!(!hub.is_accepting().await);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_transports_to_close() {
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

        let hub = Arc::new(Hub::default());
        for id in ["a", "b"] {
            let connection = Connection::new(
                ConnectionId::from(id),
                NullSink,
                futures::stream::pending().boxed(),
            );
            hub.admit(connection).await.unwrap();
        }
        assert_eq!(hub.open_transports(), 2);

        let (tx, _rx) = broadcast::channel(1);
        let result = GracefulShutdown::new(hub.clone(), tx)
            .execute("test shutdown")
            .await;

        assert!(result.success);
        assert_eq!(result.connections_signalled, 2);
        assert_eq!(result.transports_remaining, 0);
        assert!(hub.is_empty().await);
    }

    #[test]
    fn test_shutdown_config_from_settings() {
        let config = ShutdownConfig::from(&ShutdownSettings { drain_timeout: 3 });
        assert_eq!(config.drain_timeout, Duration::from_secs(3));
        assert_eq!(ShutdownConfig::default().drain_timeout, Duration::from_secs(10));
    }
}
