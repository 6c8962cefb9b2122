mod http;

pub use http::{broadcast_event, BroadcastEventRequest, BroadcastEventResponse};
