//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::hub::{BroadcastReport, EvictReason, HubError};

use super::{
    BROADCASTS_TOTAL, CONNECTIONS_ADMITTED_TOTAL, CONNECTIONS_EVICTED_TOTAL,
    CONNECTIONS_LIVE, CONNECTIONS_REJECTED_TOTAL, CONNECTION_DURATION, FRAMES_DROPPED_TOTAL,
    FRAMES_QUEUED_TOTAL, HEARTBEAT_ROUNDS_TOTAL, IDLE_EVICTIONS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording hub metrics
pub struct HubMetrics;

impl HubMetrics {
    pub fn record_admitted(live_connections: usize) {
        CONNECTIONS_ADMITTED_TOTAL.inc();
        CONNECTIONS_LIVE.set(live_connections as i64);
    }

    pub fn record_rejected(error: &HubError) {
        let reason = match error {
            HubError::DuplicateIdentity(_) => "duplicate_identity",
            HubError::ShuttingDown => "shutting_down",
        };
        CONNECTIONS_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn record_evicted(reason: EvictReason, live_connections: usize) {
        CONNECTIONS_EVICTED_TOTAL
            .with_label_values(&[reason.as_str()])
            .inc();
        CONNECTIONS_LIVE.set(live_connections as i64);
    }

    pub fn record_broadcast(report: &BroadcastReport) {
        BROADCASTS_TOTAL.inc();
        FRAMES_QUEUED_TOTAL.inc_by(report.recipients as u64);
        FRAMES_DROPPED_TOTAL.inc_by(report.dropped as u64);
    }

    pub fn observe_connection_duration(seconds: f64) {
        CONNECTION_DURATION.observe(seconds);
    }
}

/// Helper struct for recording heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_round() {
        HEARTBEAT_ROUNDS_TOTAL.inc();
    }

    pub fn record_idle_evictions(count: u64) {
        IDLE_EVICTIONS_TOTAL.inc_by(count);
    }
}
