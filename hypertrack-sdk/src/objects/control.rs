//! Bodies of the control API.

use serde::{Deserialize, Serialize};

use super::filter::FilterSpec;
use super::health::ConnectionHealth;
use super::identity::Scope;

/// `PUT /subscribers/{subscriber}/filter`.
///
/// Without a scope the filter replaces the one on every registration of the
/// subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFilterRequest {
    #[serde(default)]
    pub scope: Option<Scope>,
    pub filter: FilterSpec,
}

/// `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub connections: Vec<ConnectionHealth>,
}

/// Result of a subscribe or unsubscribe call. `changed` is false when the
/// call was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionChange {
    pub changed: bool,
}

/// Number of registrations a filter update or reactivation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedRegistrations {
    pub affected: usize,
}
