//! Liveness and store health endpoints

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::warn;

use super::AppState;
use crate::reconcile::parse_cursor;
use crate::store::keys;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /
pub async fn index() -> impl IntoResponse {
    "sup"
}

/// GET /health - 503 when the store is unreachable
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let probe = match state.store.ping().await {
        Ok(()) => state.store.get_string(keys::CURSOR).await,
        Err(e) => Err(e),
    };

    match probe {
        Ok(cursor) => (
            StatusCode::OK,
            Json(HealthResponse {
                healthy: true,
                last_update: Some(parse_cursor(cursor)),
                error: None,
            }),
        ),
        Err(e) => {
            warn!(error = %e, "Store health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    healthy: false,
                    last_update: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
