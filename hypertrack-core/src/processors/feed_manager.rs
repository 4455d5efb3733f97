//! HyperliquidFeedManager processor.
//!
//! The HyperliquidFeedManager is responsible for:
//! - Watching the registry's tracked-address set
//! - Keeping exactly one supervised Hyperliquid connection per tracked
//!   address, capped at the configured maximum
//! - Reconciling by diff, so unchanged addresses keep their connection
//! - Registering each connection's health on the [`HealthBoard`]

use crate::adapters::hyperliquid::HyperliquidAdapter;
use crate::events::VenueEventSender;
use crate::health::HealthBoard;
use crate::processors::supervisor::{ConnectionSupervisor, SupervisorConfig};
use hypertrack_sdk::Address;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

/// A running per-address supervisor.
struct Feed {
    address: Address,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct HyperliquidFeedManager {
    endpoint: Url,
    events_tx: VenueEventSender,
    config: SupervisorConfig,
    health: HealthBoard,
    max_addresses: usize,
}

fn board_key(address: &Address) -> String {
    format!("hyperliquid:{}", address.as_str())
}

impl HyperliquidFeedManager {
    pub fn new(
        endpoint: Url,
        events_tx: VenueEventSender,
        config: SupervisorConfig,
        health: HealthBoard,
        max_addresses: usize,
    ) -> Self {
        Self {
            endpoint,
            events_tx,
            config,
            health,
            max_addresses,
        }
    }

    /// Run until shutdown, reconciling on every tracked-set change.
    ///
    /// On exit every per-address supervisor is signalled and awaited so its
    /// socket is closed before the bus goes away.
    pub async fn run(
        self,
        mut tracked_rx: watch::Receiver<Vec<Address>>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut feeds: Vec<Feed> = Vec::new();
        let initial = tracked_rx.borrow_and_update().clone();
        self.apply_diff(&mut feeds, &initial).await;
        info!(
            "HyperliquidFeedManager started with {} tracked addresses",
            feeds.len()
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("HyperliquidFeedManager received shutdown signal");
                        break;
                    }
                }

                changed = tracked_rx.changed() => {
                    if changed.is_err() {
                        info!("Subscription registry dropped");
                        break;
                    }
                    let tracked = tracked_rx.borrow_and_update().clone();
                    self.apply_diff(&mut feeds, &tracked).await;
                    info!(
                        "HyperliquidFeedManager reconciled, {} active feeds",
                        feeds.len()
                    );
                }
            }
        }

        for feed in &feeds {
            let _ = feed.shutdown_tx.send(true);
        }
        for feed in feeds {
            if let Err(e) = feed.handle.await {
                warn!(address = %feed.address, error = %e, "Feed task failed");
            }
            self.health.remove(&board_key(&feed.address)).await;
        }

        info!("HyperliquidFeedManager shutdown complete");
    }

    /// Stop feeds whose address is no longer tracked and start feeds for
    /// newly tracked addresses.
    async fn apply_diff(&self, active: &mut Vec<Feed>, tracked: &[Address]) {
        let mut removed = Vec::new();
        active.retain(|feed| {
            let keep = tracked.contains(&feed.address);
            if !keep {
                info!(address = %feed.address, "Stopping feed for untracked address");
                let _ = feed.shutdown_tx.send(true);
                removed.push(feed.address.clone());
            }
            keep
        });
        for address in &removed {
            self.health.remove(&board_key(address)).await;
        }

        for address in tracked {
            if active.iter().any(|feed| &feed.address == address) {
                continue;
            }
            if active.len() >= self.max_addresses {
                warn!(
                    %address,
                    max_addresses = self.max_addresses,
                    "Tracked address limit reached, not starting feed"
                );
                continue;
            }
            info!(%address, "Starting feed for tracked address");
            active.push(self.spawn_feed(address.clone()).await);
        }
    }

    async fn spawn_feed(&self, address: Address) -> Feed {
        let adapter = Arc::new(HyperliquidAdapter::new(
            self.endpoint.clone(),
            address.clone(),
        ));
        let (supervisor, health_rx) =
            ConnectionSupervisor::new(adapter, self.events_tx.clone(), self.config.clone());
        self.health.register(board_key(&address), health_rx).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(supervisor.run(shutdown_rx));
        Feed {
            address,
            shutdown_tx,
            handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::subscriptions::SubscriptionRegistry;
    use hypertrack_sdk::{FilterSpec, Scope, SubscriberId, Venue};
    use std::str::FromStr;
    use std::time::Duration;

    fn address(n: u8) -> Address {
        Address::from_str(&format!("0x{}", format!("{n:02x}").repeat(20))).unwrap()
    }

    async fn wait_for_feeds(board: &HealthBoard, expected: usize) -> bool {
        for _ in 0..200 {
            if board.snapshot().await.len() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    fn manager(board: &HealthBoard, max_addresses: usize) -> (HyperliquidFeedManager, EventBus) {
        let (senders, bus) = EventBus::new(8, [Venue::Hyperliquid]);
        // Nothing listens on port 9; supervisors just keep backing off.
        let endpoint = Url::parse("ws://127.0.0.1:9/ws").unwrap();
        let manager = HyperliquidFeedManager::new(
            endpoint,
            senders.sender(Venue::Hyperliquid).unwrap(),
            SupervisorConfig::default(),
            board.clone(),
            max_addresses,
        );
        (manager, bus)
    }

    #[tokio::test]
    async fn test_feeds_follow_tracked_addresses() {
        let board = HealthBoard::new();
        let registry = SubscriptionRegistry::new(10);
        let (manager, _bus) = manager(&board, 10);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        registry
            .subscribe(Scope::Address(address(1)), SubscriberId(1), FilterSpec::default())
            .await
            .unwrap();
        let handle = tokio::spawn(manager.run(registry.tracked_addresses(), shutdown_rx));
        assert!(wait_for_feeds(&board, 1).await);

        registry
            .subscribe(Scope::Address(address(2)), SubscriberId(1), FilterSpec::default())
            .await
            .unwrap();
        assert!(wait_for_feeds(&board, 2).await);

        registry
            .unsubscribe(&Scope::Address(address(1)), SubscriberId(1))
            .await;
        assert!(wait_for_feeds(&board, 1).await);
        assert_eq!(
            board.snapshot().await[0].label,
            format!("hyperliquid:{}", address(2).short())
        );

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(board.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_feed_count_is_capped() {
        let board = HealthBoard::new();
        let registry = SubscriptionRegistry::new(10);
        let (manager, _bus) = manager(&board, 2);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        for n in 1..=3 {
            registry
                .subscribe(Scope::Address(address(n)), SubscriberId(7), FilterSpec::default())
                .await
                .unwrap();
        }
        let handle = tokio::spawn(manager.run(registry.tracked_addresses(), shutdown_rx));
        assert!(wait_for_feeds(&board, 2).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(board.snapshot().await.len(), 2);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
