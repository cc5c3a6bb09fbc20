//! HTTP endpoints for health checks and bot diagnostics.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::channels::TelegramChannel;

/// Shared state for the HTTP routes.
#[derive(Clone, Default)]
pub struct ServerState {
    /// Telegram bot to diagnose. `None` when running on another channel.
    pub telegram: Option<Arc<TelegramChannel>>,
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "OK" }))
}

/// GET /check-group
///
/// Re-runs the bot credential and target-group checks. Results are logged;
/// the report is echoed back for convenience.
async fn check_group(State(state): State<ServerState>) -> impl IntoResponse {
    match state.telegram {
        Some(bot) => {
            let report = bot.check_bot_status().await;
            Json(serde_json::json!({
                "status": "check completed",
                "report": report,
            }))
            .into_response()
        }
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "status": "bot not initialized" })),
        )
            .into_response(),
    }
}

/// Build the HTTP router.
pub fn routes(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/check-group", get(check_group))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = get_json(routes(ServerState::default()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "status": "OK" }));
    }

    #[tokio::test]
    async fn check_group_without_bot() {
        let (status, body) = get_json(routes(ServerState::default()), "/check-group").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "bot not initialized");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let resp = routes(ServerState::default())
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
