//! Hub counters and report structures

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Outcome of a single broadcast call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Connections whose queue accepted the frame
    pub recipients: usize,
    /// Connections that could not take the frame because their queue was full
    pub dropped: usize,
    /// Connections evicted as a result of this call
    pub evicted: usize,
}

#[derive(Debug, Default)]
pub(crate) struct HubCounters {
    pub admitted: AtomicU64,
    pub rejected: AtomicU64,
    pub evicted: AtomicU64,
    pub broadcasts: AtomicU64,
    pub frames_queued: AtomicU64,
    pub frames_dropped: AtomicU64,
}

impl HubCounters {
    pub fn record_report(&self, report: &BroadcastReport) {
        self.frames_queued
            .fetch_add(report.recipients as u64, Ordering::Relaxed);
        self.frames_dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
    }
}

/// Snapshot of hub statistics
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub live_connections: usize,
    pub accepting: bool,
    pub open_transports: usize,
    pub total_admitted: u64,
    pub total_rejected: u64,
    pub total_evicted: u64,
    pub total_broadcasts: u64,
    pub frames_queued: u64,
    pub frames_dropped: u64,
}
