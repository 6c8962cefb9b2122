//! Prometheus metrics for the realtime hub.
//!
//! - Connection metrics (live connections, admissions, rejections, evictions)
//! - Broadcast metrics (broadcast calls, frames queued and dropped)
//! - Heartbeat metrics

mod helpers;

pub use helpers::{encode_metrics, HeartbeatMetrics, HubMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "blog_hub";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Connections currently in the live set
    pub static ref CONNECTIONS_LIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_live", METRIC_PREFIX),
        "Number of connections currently admitted to the hub"
    ).unwrap();

    pub static ref CONNECTIONS_ADMITTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_admitted_total", METRIC_PREFIX),
        "Total connections admitted"
    ).unwrap();

    /// Rejected admissions by reason
    pub static ref CONNECTIONS_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_rejected_total", METRIC_PREFIX),
        "Total admissions rejected",
        &["reason"]
    ).unwrap();

    /// Evictions by reason
    pub static ref CONNECTIONS_EVICTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_evicted_total", METRIC_PREFIX),
        "Total connections evicted",
        &["reason"]
    ).unwrap();

    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_connection_duration_seconds", METRIC_PREFIX),
        "Time from admission until the transport was released",
        vec![1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0, 14400.0]
    ).unwrap();

    // ============================================================================
    // Broadcast Metrics
    // ============================================================================

    pub static ref BROADCASTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcasts_total", METRIC_PREFIX),
        "Total broadcast calls"
    ).unwrap();

    /// Frames accepted into outbound queues
    pub static ref FRAMES_QUEUED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_queued_total", METRIC_PREFIX),
        "Total frames accepted into connection outbound queues"
    ).unwrap();

    /// Frames refused because an outbound queue was full
    pub static ref FRAMES_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_dropped_total", METRIC_PREFIX),
        "Total frames dropped because a connection outbound queue was full"
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    pub static ref HEARTBEAT_ROUNDS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_heartbeat_rounds_total", METRIC_PREFIX),
        "Total heartbeat rounds"
    ).unwrap();

    pub static ref IDLE_EVICTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_idle_evictions_total", METRIC_PREFIX),
        "Total connections evicted by the idle sweep"
    ).unwrap();
}
