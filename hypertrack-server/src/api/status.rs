use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
};
use hypertrack_core::stats::GetStats;
use hypertrack_sdk::{ConnectionState, HealthResponse, Venue};
use kanau::processor::Processor;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/stats/{venue}", get(stats))
}

/// `GET /health` — `healthy` when every connection is subscribed.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let connections = state.health.snapshot().await;
    let status = match connections
        .iter()
        .all(|c| c.state == ConnectionState::Subscribed)
    {
        true => "healthy",
        false => "degraded",
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connections,
    })
}

/// `GET /stats/{venue}`.
async fn stats(State(state): State<AppState>, Path(venue): Path<Venue>) -> impl IntoResponse {
    let Ok(snapshot) = state.stats.process(GetStats { venue }).await;
    Json(snapshot)
}
