use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::put,
};
use hypertrack_core::subscriptions::{
    DisableLiquidationMonitoring, EnableLiquidationMonitoring, SubscribeAddress,
    UnsubscribeAddress,
};
use hypertrack_sdk::{FilterSpec, SubscriberId, SubscriptionChange};
use kanau::processor::Processor;

use super::{ApiError, parse_address};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/subscriptions/address/{address}/{subscriber}",
            put(subscribe_address).delete(unsubscribe_address),
        )
        .route(
            "/subscriptions/liquidations/{subscriber}",
            put(enable_liquidations).delete(disable_liquidations),
        )
}

/// `PUT /subscriptions/address/{address}/{subscriber}` — start tracking an
/// account for a subscriber with the given filter.
async fn subscribe_address(
    State(state): State<AppState>,
    Path((address, subscriber)): Path<(String, SubscriberId)>,
    Json(filter): Json<FilterSpec>,
) -> Result<impl IntoResponse, ApiError> {
    let address = parse_address(&address)?;
    let changed = state
        .registry
        .process(SubscribeAddress {
            address,
            subscriber,
            filter,
        })
        .await?;
    if changed {
        state.persist().await;
    }
    Ok(Json(SubscriptionChange { changed }))
}

/// `DELETE /subscriptions/address/{address}/{subscriber}`.
async fn unsubscribe_address(
    State(state): State<AppState>,
    Path((address, subscriber)): Path<(String, SubscriberId)>,
) -> Result<impl IntoResponse, ApiError> {
    let address = parse_address(&address)?;
    let Ok(changed) = state
        .registry
        .process(UnsubscribeAddress {
            address,
            subscriber,
        })
        .await;
    if changed {
        state.persist().await;
    }
    Ok(Json(SubscriptionChange { changed }))
}

/// `PUT /subscriptions/liquidations/{subscriber}`.
async fn enable_liquidations(
    State(state): State<AppState>,
    Path(subscriber): Path<SubscriberId>,
    Json(filter): Json<FilterSpec>,
) -> Result<impl IntoResponse, ApiError> {
    let changed = state
        .registry
        .process(EnableLiquidationMonitoring { subscriber, filter })
        .await?;
    if changed {
        state.persist().await;
    }
    Ok(Json(SubscriptionChange { changed }))
}

/// `DELETE /subscriptions/liquidations/{subscriber}`.
async fn disable_liquidations(
    State(state): State<AppState>,
    Path(subscriber): Path<SubscriberId>,
) -> impl IntoResponse {
    let Ok(changed) = state
        .registry
        .process(DisableLiquidationMonitoring { subscriber })
        .await;
    if changed {
        state.persist().await;
    }
    Json(SubscriptionChange { changed })
}
