use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::Value;
use tracing::debug;

use tidings_types::DispatchReport;
use tidings_types::api::EnqueueResponse;

use crate::error::ApiError;
use crate::state::AppState;

/// Queue one payload for the next envelope. Delivery happens on the next
/// tick, so this only acknowledges acceptance.
pub async fn enqueue(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let pending = state.notifier.enqueue(payload)?;
    debug!(pending, "Notification queued");
    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse { pending })))
}

pub async fn recent_deliveries(State(state): State<AppState>) -> Json<Vec<DispatchReport>> {
    Json(state.deliveries.snapshot())
}
