use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};

use crate::error::AppError;
use crate::hub::{ConnectionId, Hub};
use crate::server::AppState;

use super::Connection;

/// WebSocket upgrade handler
///
/// A failed handshake is answered with 400 and never reaches the hub.
#[tracing::instrument(name = "ws.upgrade", skip_all, fields(remote = %remote))]
pub async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let upgrade = upgrade.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "WebSocket handshake failed");
        AppError::Handshake(rejection.body_text())
    })?;

    let hub = state.hub.clone();
    Ok(upgrade
        .on_failed_upgrade(move |e| {
            tracing::warn!(remote = %remote, error = %e, "WebSocket upgrade did not complete");
        })
        .on_upgrade(move |socket| admit_socket(hub, socket, remote)))
}

async fn admit_socket(hub: Arc<Hub>, socket: WebSocket, remote: SocketAddr) {
    let connection = Connection::from_websocket(ConnectionId::from(remote), socket);

    if let Err(e) = hub.admit(connection).await {
        tracing::warn!(remote = %remote, error = %e, "WebSocket connection not admitted");
    }
}
