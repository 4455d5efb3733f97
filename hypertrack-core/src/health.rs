//! Registry of live connection health receivers.

use hypertrack_sdk::ConnectionHealth;
use itertools::Itertools;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};

/// Every supervised connection publishes its [`ConnectionHealth`] on a
/// watch channel; the board keeps the receivers so the API can read them.
#[derive(Clone, Default)]
pub struct HealthBoard {
    entries: Arc<RwLock<Vec<(String, watch::Receiver<ConnectionHealth>)>>>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under `label`, replacing any previous entry.
    pub async fn register(&self, label: impl Into<String>, rx: watch::Receiver<ConnectionHealth>) {
        let label = label.into();
        let mut entries = self.entries.write().await;
        entries.retain(|(l, _)| *l != label);
        entries.push((label, rx));
    }

    pub async fn remove(&self, label: &str) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(l, _)| l != label);
        entries.len() != before
    }

    /// Current health of every registered connection, ordered by venue then
    /// label.
    pub async fn snapshot(&self) -> Vec<ConnectionHealth> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(_, rx)| rx.borrow().clone())
            .sorted_by(|a, b| a.venue.cmp(&b.venue).then_with(|| a.label.cmp(&b.label)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hypertrack_sdk::{ConnectionState, Venue};

    fn health(venue: Venue, label: &str, state: ConnectionState) -> ConnectionHealth {
        ConnectionHealth {
            venue,
            label: label.to_string(),
            state,
            consecutive_failures: 0,
            backoff_secs: 1,
            last_activity: None,
        }
    }

    #[tokio::test]
    async fn test_snapshot_follows_watch_updates() {
        let board = HealthBoard::new();
        let (tx, rx) = watch::channel(health(Venue::Bybit, "bybit", ConnectionState::Connecting));
        board.register("bybit", rx).await;
        assert_eq!(board.snapshot().await[0].state, ConnectionState::Connecting);

        tx.send_modify(|h| h.state = ConnectionState::Subscribed);
        assert_eq!(board.snapshot().await[0].state, ConnectionState::Subscribed);
    }

    #[tokio::test]
    async fn test_register_replaces_and_remove() {
        let board = HealthBoard::new();
        let (_tx1, rx1) = watch::channel(health(Venue::Hyperliquid, "hl:b", ConnectionState::Idle));
        let (_tx2, rx2) = watch::channel(health(Venue::Binance, "binance", ConnectionState::Idle));
        let (_tx3, rx3) = watch::channel(health(Venue::Hyperliquid, "hl:a", ConnectionState::Idle));
        board.register("hl:b", rx1.clone()).await;
        board.register("binance", rx2).await;
        board.register("hl:a", rx3).await;
        board.register("hl:b", rx1).await;

        let labels: Vec<_> = board.snapshot().await.into_iter().map(|h| h.label).collect();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels[0], "binance");

        assert!(board.remove("hl:a").await);
        assert!(!board.remove("hl:a").await);
        assert_eq!(board.snapshot().await.len(), 2);
    }
}
