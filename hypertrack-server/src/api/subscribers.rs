use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{post, put},
};
use hypertrack_core::subscriptions::{Reactivate, UpdateFilter};
use hypertrack_sdk::{AffectedRegistrations, SubscriberId, UpdateFilterRequest};
use kanau::processor::Processor;

use super::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/subscribers/{subscriber}/filter", put(update_filter))
        .route("/subscribers/{subscriber}/reactivate", post(reactivate))
}

/// `PUT /subscribers/{subscriber}/filter` — replace the filter on one
/// registration, or on all of them when no scope is given.
async fn update_filter(
    State(state): State<AppState>,
    Path(subscriber): Path<SubscriberId>,
    Json(request): Json<UpdateFilterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let affected = state
        .registry
        .process(UpdateFilter {
            subscriber,
            scope: request.scope,
            filter: request.filter,
        })
        .await?;
    if affected == 0 {
        return Err(ApiError::NotFound("no matching registration"));
    }
    state.persist().await;
    Ok(Json(AffectedRegistrations { affected }))
}

/// `POST /subscribers/{subscriber}/reactivate` — resume deliveries after a
/// permanent failure was resolved. `affected` counts the registrations that
/// were inactive.
async fn reactivate(
    State(state): State<AppState>,
    Path(subscriber): Path<SubscriberId>,
) -> impl IntoResponse {
    let Ok(affected) = state.registry.process(Reactivate { subscriber }).await;
    if affected > 0 {
        state.persist().await;
    }
    Json(AffectedRegistrations { affected })
}
