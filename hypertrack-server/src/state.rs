//! Application state shared across all request handlers.

use crate::store::JsonFileStore;
use hypertrack_core::health::HealthBoard;
use hypertrack_core::stats::StatsAggregator;
use hypertrack_core::subscriptions::SubscriptionRegistry;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub registry: SubscriptionRegistry,
    pub stats: StatsAggregator,
    pub health: HealthBoard,
    pub store: Arc<JsonFileStore>,
}

impl AppState {
    pub fn new(
        registry: SubscriptionRegistry,
        stats: StatsAggregator,
        health: HealthBoard,
        store: JsonFileStore,
    ) -> Self {
        Self {
            registry,
            stats,
            health,
            store: Arc::new(store),
        }
    }

    /// Save the registry after a mutation.
    ///
    /// A failed save is logged, not returned: the in-memory change already
    /// took effect and the next successful save carries it.
    pub async fn persist(&self) {
        let snapshot = self.registry.snapshot().await;
        if let Err(e) = self.store.save(&snapshot).await {
            tracing::error!(
                path = %self.store.path().display(),
                error = %e,
                "Failed to persist subscriptions"
            );
        }
    }
}
