mod connection;
mod handler;
mod message;
mod transport;

pub use connection::Connection;
pub(crate) use connection::{close_sink, SendLoop};
pub use handler::ws_handler;
pub use message::{EventEnvelope, OutboundFrame, POST_CREATED};
pub use transport::{
    websocket_inbound, FrameSink, InboundEvent, InboundStream, TransportError, WebSocketSink,
};
