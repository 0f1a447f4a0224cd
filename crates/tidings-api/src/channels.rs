use axum::{
    Json,
    extract::{Path, State},
};
use tracing::{error, info};

use tidings_gateway::inbound::apply_update;
use tidings_types::api::{CompactResponse, UpdateResponse};
use tidings_types::events::BotUpdate;
use tidings_types::{ChannelIdentity, LookupKey};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_channels(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChannelIdentity>>, ApiError> {
    Ok(Json(state.store.identities()?))
}

/// `{key}` is a name, or a channel id when it parses as an integer.
pub async fn get_channel(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ChannelIdentity>, ApiError> {
    state
        .store
        .lookup(LookupKey::parse(&key))?
        .map(Json)
        .ok_or(ApiError::NotFound(key))
}

/// Bot API webhook: learn identities from an inbound update.
pub async fn bot_update(
    State(state): State<AppState>,
    Json(update): Json<BotUpdate>,
) -> Result<Json<UpdateResponse>, ApiError> {
    // Upserts fsync the log; keep them off the async runtime
    let store = state.store.clone();
    let update_id = update.update_id;
    let changed = tokio::task::spawn_blocking(move || apply_update(&store, &update))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })??;

    if changed > 0 {
        info!(update_id, changed, "Channel identities updated from bot update");
    }
    Ok(Json(UpdateResponse { changed }))
}

pub async fn compact(State(state): State<AppState>) -> Result<Json<CompactResponse>, ApiError> {
    let store = state.store.clone();
    let records = tokio::task::spawn_blocking(move || store.compact())
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })??;
    Ok(Json(CompactResponse { records }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::router;
    use crate::testing::{call, state};

    #[tokio::test]
    async fn lookup_by_name_and_id() {
        let state = state();
        state.store.upsert_user("alice", &["Alice A.".to_string()], 42).unwrap();

        let (status, body) = call(router(state.clone()), "GET", "/channels/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["channelId"], 42);
        assert_eq!(body["kind"], "user");

        let (status, body) = call(router(state.clone()), "GET", "/channels/42", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["externalId"], "alice");

        let (status, body) = call(router(state), "GET", "/channels/bob", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Channel not found: bob");
    }

    #[tokio::test]
    async fn bot_update_registers_private_chat() {
        let state = state();
        let update = json!({
            "update_id": 1,
            "message": {
                "chat": {"id": 555, "type": "private", "username": "carol"},
                "from": {"id": 555, "is_bot": false, "username": "carol", "first_name": "Carol"},
                "text": "/start"
            }
        });

        let (status, body) = call(router(state.clone()), "POST", "/bot/updates", Some(update.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], 1);
        assert_eq!(state.store.lookup("carol").unwrap().unwrap().channel_id, 555);

        // Same update again changes nothing
        let (_, body) = call(router(state.clone()), "POST", "/bot/updates", Some(update)).await;
        assert_eq!(body["changed"], 0);

        let (_, body) = call(router(state), "GET", "/channels", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn compact_reports_record_count() {
        let state = state();
        state.store.upsert_user("bob", &[], 10).unwrap();
        state.store.upsert_user("bob", &[], 20).unwrap();

        let (status, body) = call(router(state), "POST", "/channels/compact", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["records"], 1);
    }
}
