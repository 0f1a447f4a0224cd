use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use tidings_gateway::NotifierError;
use tidings_store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Channel not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Envelope feed is not enabled")]
    FeedDisabled,

    #[error("Channel store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notifier error: {0}")]
    Notifier(#[from] NotifierError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(_) | ApiError::FeedDisabled => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Store(_) | ApiError::Notifier(_) | ApiError::Internal(_) => {
                error!("{}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_details_are_not_leaked() {
        let response = ApiError::Store(StoreError::Poisoned).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = ApiError::NotFound("bob".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError::FeedDisabled.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
