//! Hub and HTTP surface integration tests
//!
//! Connections here use an in-memory transport so the tests exercise the
//! hub, its send loops and the router without opening sockets.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{Request, StatusCode},
    Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tower::ServiceExt;

use blog_realtime_hub::config::{ApiConfig, Settings};
use blog_realtime_hub::hub::{ConnectionId, Hub};
use blog_realtime_hub::server::{create_app, AppState, API_KEY_HEADER};
use blog_realtime_hub::websocket::{
    Connection, FrameSink, InboundEvent, OutboundFrame, TransportError, POST_CREATED,
};

struct ChannelSink {
    frames: mpsc::UnboundedSender<OutboundFrame>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_frame(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.frames
            .send(frame)
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct Client {
    frames: mpsc::UnboundedReceiver<OutboundFrame>,
    closes: Arc<AtomicUsize>,
    _inbound: futures::channel::mpsc::UnboundedSender<InboundEvent>,
}

impl Client {
    async fn next_event(&mut self) -> Option<Value> {
        loop {
            match timeout(Duration::from_secs(2), self.frames.recv()).await {
                Ok(Some(OutboundFrame::Text(text))) => return serde_json::from_str(text.as_str()).ok(),
                Ok(Some(OutboundFrame::Ping)) => continue,
                _ => return None,
            }
        }
    }

    async fn expect_nothing(&mut self) {
        let received = timeout(Duration::from_millis(150), self.frames.recv()).await;
        assert!(!matches!(received, Ok(Some(_))), "unexpected frame {:?}", received);
    }
}

fn connect(id: &str) -> (Connection, Client) {
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = futures::channel::mpsc::unbounded();
    let closes = Arc::new(AtomicUsize::new(0));
    let connection = Connection::new(
        ConnectionId::from(id),
        ChannelSink {
            frames: frames_tx,
            closes: closes.clone(),
        },
        inbound_rx.boxed(),
    );
    let client = Client {
        frames: frames_rx,
        closes,
        _inbound: inbound_tx,
    };
    (connection, client)
}

// =============================================================================
// Hub scenarios
// =============================================================================

mod hub_tests {
    use super::*;

    #[tokio::test]
    async fn test_post_created_reaches_remaining_connections_after_eviction() {
        let hub = Arc::new(Hub::default());
        let (conn1, mut client1) = connect("addr1");
        let (conn2, mut client2) = connect("addr2");
        let addr1 = hub.admit(conn1).await.unwrap();
        hub.admit(conn2).await.unwrap();

        let report = hub.broadcast(POST_CREATED, &json!({"id": "p1"}), None).await;
        assert_eq!(report.recipients, 2);

        for client in [&mut client1, &mut client2] {
            let event = client.next_event().await.expect("first event");
            assert_eq!(event, json!({"type": "Post_Created", "payload": {"id": "p1"}}));
        }

        assert!(hub.evict(&addr1).await);

        let report = hub.broadcast(POST_CREATED, &json!({"id": "p2"}), None).await;
        assert_eq!(report.recipients, 1);

        let event = client2.next_event().await.expect("second event");
        assert_eq!(event["payload"]["id"], "p2");
        client1.expect_nothing().await;
        assert_eq!(client1.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_originator_is_excluded() {
        let hub = Arc::new(Hub::default());
        let (author, mut author_client) = connect("author");
        let (reader, mut reader_client) = connect("reader");
        let author_id = hub.admit(author).await.unwrap();
        hub.admit(reader).await.unwrap();

        hub.broadcast(POST_CREATED, &json!({"id": "p1"}), Some(&author_id))
            .await;

        assert!(reader_client.next_event().await.is_some());
        author_client.expect_nothing().await;
    }

    #[tokio::test]
    async fn test_stats_track_admissions_and_broadcasts() {
        let hub = Arc::new(Hub::default());
        let (conn, _client) = connect("a");
        let (dup, _dup_client) = connect("a");
        hub.admit(conn).await.unwrap();
        assert!(hub.admit(dup).await.is_err());

        hub.broadcast("Ping_Test", &json!(null), None).await;

        let stats = hub.stats().await;
        assert_eq!(stats.live_connections, 1);
        assert_eq!(stats.total_admitted, 1);
        assert_eq!(stats.total_rejected, 1);
        assert_eq!(stats.total_broadcasts, 1);
        assert_eq!(stats.frames_queued, 1);
        assert!(stats.accepting);
    }
}

// =============================================================================
// HTTP surface
// =============================================================================

mod http_tests {
    use super::*;

    const API_KEY: &str = "test-key";

    fn app_with_key() -> (Router, AppState) {
        let settings = Settings {
            api: ApiConfig {
                key: Some(API_KEY.to_string()),
            },
            ..Settings::default()
        };
        let state = AppState::new(settings);
        let remote: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let app = create_app(state.clone()).layer(MockConnectInfo(remote));
        (app, state)
    }

    fn broadcast_request(body: Value, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/events/broadcast")
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ws_without_upgrade_headers_is_rejected() {
        let (app, state) = app_with_key();

        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "HANDSHAKE_FAILED");
        assert_eq!(state.hub.stats().await.total_admitted, 0);
    }

    #[tokio::test]
    async fn test_broadcast_trigger_requires_api_key() {
        let (app, _state) = app_with_key();

        let missing = app
            .clone()
            .oneshot(broadcast_request(json!({"type": "Post_Created"}), None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .oneshot(broadcast_request(json!({"type": "Post_Created"}), Some("nope")))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_broadcast_trigger_fans_out_with_exclusion() {
        let (app, state) = app_with_key();
        let (a, mut client_a) = connect("a");
        let (b, mut client_b) = connect("b");
        state.hub.admit(a).await.unwrap();
        state.hub.admit(b).await.unwrap();

        let response = app
            .oneshot(broadcast_request(
                json!({"type": "Post_Created", "payload": {"id": "p9"}, "exclude": "b"}),
                Some(API_KEY),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["recipients"], 1);
        assert_eq!(body["dropped"], 0);

        let event = client_a.next_event().await.unwrap();
        assert_eq!(event["payload"]["id"], "p9");
        client_b.expect_nothing().await;
    }

    #[tokio::test]
    async fn test_broadcast_trigger_rejects_empty_type() {
        let (app, _state) = app_with_key();

        let response = app
            .oneshot(broadcast_request(json!({"type": ""}), Some(API_KEY)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_health_and_stats() {
        let (app, state) = app_with_key();
        let (conn, _client) = connect("a");
        state.hub.admit(conn).await.unwrap();

        let health = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        let body = json_body(health).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"]["live"], 1);

        let stats = app
            .clone()
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(stats).await["live_connections"], 1);

        let metrics = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(metrics.status(), StatusCode::OK);
    }
}
