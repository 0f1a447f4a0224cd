/// HTTP surface of the notification pipeline.
///
/// Handlers stay thin: each one calls into the store or the notifier and
/// maps the result onto a status code.

pub mod chain;
pub mod channels;
pub mod error;
pub mod feed;
pub mod notifications;
pub mod state;

use axum::{
    Router,
    routing::{get, post, put},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/notifications", post(notifications::enqueue))
        .route("/deliveries", get(notifications::recent_deliveries))
        .route("/bot/updates", post(channels::bot_update))
        .route("/channels", get(channels::list_channels))
        .route("/channels/compact", post(channels::compact))
        .route("/channels/{key}", get(channels::get_channel))
        .route("/chain", get(chain::status))
        .route("/chain/enabled", put(chain::set_enabled))
        .route("/chain/verify", post(chain::verify))
        .route("/feed", get(feed::feed_upgrade))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}


#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::testing::{call, state};

    #[tokio::test]
    async fn health_answers() {
        let (status, _) = call(router(state()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (status, _) = call(router(state()), "GET", "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
