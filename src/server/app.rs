use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::api::api_routes;
use crate::websocket::ws_handler;

use super::AppState;

/// Path browsers connect to for live post events
pub const WS_PATH: &str = "/ws";

/// Build the full router: the WebSocket entry point plus the HTTP API
///
/// `/ws` needs `ConnectInfo<SocketAddr>`, so serve it with
/// `into_make_service_with_connect_info`.
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = api_routes(state.clone());

    Router::new()
        .route(WS_PATH, get(ws_handler))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
