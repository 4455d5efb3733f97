//! Control API handlers.
//!
//! These endpoints are called by the chat front-end (or an operator) to
//! manage registrations and read pipeline state.
//!
//! # Endpoints
//!
//! - `GET    /health`                                    – per-connection state
//! - `PUT    /subscriptions/address/{address}/{subscriber}` – track an address
//! - `DELETE /subscriptions/address/{address}/{subscriber}` – stop tracking
//! - `PUT    /subscriptions/liquidations/{subscriber}`   – enable liquidation alerts
//! - `DELETE /subscriptions/liquidations/{subscriber}`   – disable liquidation alerts
//! - `PUT    /subscribers/{subscriber}/filter`           – replace a filter
//! - `POST   /subscribers/{subscriber}/reactivate`       – clear the inactive flag
//! - `GET    /stats/{venue}`                             – rolling counters

use axum::{Json, Router, http::StatusCode, response::IntoResponse};
use hypertrack_core::subscriptions::RegistryError;
use hypertrack_sdk::{Address, AddressParseError};
use serde::Serialize;

use crate::state::AppState;

mod status;
mod subscribers;
mod subscriptions;

/// Build the control API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(status::router())
        .merge(subscriptions::router())
        .merge(subscribers::router())
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

/// Errors that can occur in control API handlers.
#[derive(Debug)]
pub(crate) enum ApiError {
    InvalidAddress(AddressParseError),
    Registry(RegistryError),
    NotFound(&'static str),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::InvalidAddress(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Registry(e @ RegistryError::AddressLimit { .. }) => {
                (StatusCode::CONFLICT, e.to_string())
            }
            ApiError::Registry(e @ RegistryError::InvalidFilter(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what.to_string()),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        ApiError::Registry(e)
    }
}

pub(crate) fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse().map_err(ApiError::InvalidAddress)
}
