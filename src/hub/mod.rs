//! In-memory registry of live WebSocket connections and the broadcaster
//! that fans events out to them.

mod registry;
mod stats;
mod types;

pub use registry::Hub;
pub use stats::{BroadcastReport, HubStats};
pub use types::{
    BackpressurePolicy, ConnectionHandle, ConnectionId, ConnectionState, EnqueueOutcome,
    EvictReason, HubConfig, HubError,
};
