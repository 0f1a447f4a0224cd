use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};

use tidings_gateway::connection::handle_feed_connection;

use crate::error::ApiError;
use crate::state::AppState;

/// Upgrade to a WebSocket that streams every sealed envelope.
pub async fn feed_upgrade(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let (ready, feed_rx) = state
        .notifier
        .subscribe_feed()?
        .ok_or(ApiError::FeedDisabled)?;
    Ok(ws.on_upgrade(move |socket| handle_feed_connection(socket, ready, feed_rx)))
}
