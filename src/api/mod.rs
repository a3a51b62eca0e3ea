//! Read API - HTTP surface over the leaderboard store
//!
//! - `GET /` liveness string
//! - `GET /health` store probe
//! - `GET /stats?from=<cursor>` cursor-gated leaderboard snapshot

pub mod health;
pub mod stats;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::error::LeaderboardError;
use crate::reference::SharedReference;
use crate::store::SharedStore;

pub use stats::{read_stats, StatsOutcome, StatsResponse};

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub reference: SharedReference,
}

impl AppState {
    pub fn new(store: SharedStore, reference: SharedReference) -> Self {
        Self { store, reference }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::index))
        .route("/health", get(health::health))
        .route("/stats", get(stats::stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for LeaderboardError {
    fn into_response(self) -> Response {
        error!(error = %self, "Request failed");
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
