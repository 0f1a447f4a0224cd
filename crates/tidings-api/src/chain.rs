use axum::{Json, extract::State};
use tracing::warn;

use tidings_crypto::{GENESIS, verify_chain};
use tidings_types::api::{ChainStatus, SetEnabledRequest, VerifyChainRequest, VerifyChainResponse};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn status(State(state): State<AppState>) -> Result<Json<ChainStatus>, ApiError> {
    let notifier = &state.notifier;
    Ok(Json(ChainStatus {
        writer: notifier.writer_id().to_string(),
        head: notifier.head()?,
        pending: notifier.pending_len()?,
        enabled: notifier.is_enabled(),
    }))
}

/// Pause or resume sealing. Payloads keep queueing while paused.
pub async fn set_enabled(
    State(state): State<AppState>,
    Json(req): Json<SetEnabledRequest>,
) -> Result<Json<ChainStatus>, ApiError> {
    state.notifier.set_enabled(req.enabled);
    status(State(state)).await
}

/// Check a sequence of envelopes as a receiver would: every hash recomputes
/// and every envelope names its predecessor.
pub async fn verify(Json(req): Json<VerifyChainRequest>) -> Result<Json<VerifyChainResponse>, ApiError> {
    if req.envelopes.is_empty() {
        return Err(ApiError::BadRequest("no envelopes to verify".into()));
    }
    let anchor = req.anchor.as_deref().unwrap_or(GENESIS);
    let verification = verify_chain(&req.envelopes, anchor);
    if !verification.is_valid() {
        warn!(?verification, "Submitted chain failed verification");
    }
    Ok(Json(VerifyChainResponse { verification }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use tidings_crypto::GENESIS;

    use crate::router;
    use crate::testing::{call, state};

    #[tokio::test]
    async fn status_tracks_head_and_pending() {
        let state = state();
        let (_, body) = call(router(state.clone()), "GET", "/chain", None).await;
        assert_eq!(body["head"], GENESIS);
        assert_eq!(body["writer"], "api-test");
        assert_eq!(body["pending"], 0);
        assert_eq!(body["enabled"], true);

        state.notifier.enqueue(json!("m1")).unwrap();
        let (_, body) = call(router(state.clone()), "GET", "/chain", None).await;
        assert_eq!(body["pending"], 1);

        let report = state.notifier.tick().await.unwrap().unwrap();
        let (_, body) = call(router(state), "GET", "/chain", None).await;
        assert_eq!(body["head"], report.envelope_hash.as_str());
        assert_eq!(body["pending"], 0);
    }

    #[tokio::test]
    async fn disabling_stops_sealing() {
        let state = state();
        let (status, body) = call(router(state.clone()), "PUT", "/chain/enabled", Some(json!({"enabled": false}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enabled"], false);

        state.notifier.enqueue(json!("m1")).unwrap();
        assert!(state.notifier.tick().await.unwrap().is_none());
        assert_eq!(state.notifier.pending_len().unwrap(), 1);
    }

    async fn sealed_chain(n: usize) -> Vec<Value> {
        let state = state();
        let (_, mut rx) = state.notifier.subscribe_feed().unwrap().unwrap();
        let mut envelopes = Vec::new();
        for i in 0..n {
            state.notifier.enqueue(json!({"seq": i})).unwrap();
            state.notifier.tick().await.unwrap();
            let event = serde_json::to_value(rx.recv().await.unwrap()).unwrap();
            envelopes.push(event["data"].clone());
        }
        envelopes
    }

    #[tokio::test]
    async fn verify_accepts_intact_chain() {
        let envelopes = sealed_chain(3).await;
        let (status, body) = call(router(state()), "POST", "/chain/verify", Some(json!({"envelopes": envelopes}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "valid");
        assert_eq!(body["length"], 3);
    }

    #[tokio::test]
    async fn verify_reports_first_break() {
        let mut envelopes = sealed_chain(3).await;
        envelopes[1]["messages"][0] = json!({"seq": 99});
        let (_, body) = call(router(state()), "POST", "/chain/verify", Some(json!({"envelopes": envelopes}))).await;
        assert_eq!(body["result"], "hash_mismatch");
        assert_eq!(body["index"], 1);

        let envelopes = sealed_chain(2).await;
        let (_, body) = call(
            router(state()),
            "POST",
            "/chain/verify",
            Some(json!({"envelopes": [envelopes[1].clone()]})),
        )
        .await;
        assert_eq!(body["result"], "parent_mismatch");
        assert_eq!(body["index"], 0);
    }

    #[tokio::test]
    async fn verify_rejects_empty_input() {
        let (status, body) = call(router(state()), "POST", "/chain/verify", Some(json!({"envelopes": []}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("no envelopes"));
    }
}
