//! Subscription registry.
//!
//! Two lookup structures behind one `RwLock`: address-scoped registrations
//! for account events and a flat list for venue-wide liquidations. Every
//! mutation is idempotent and holds the write lock only for the in-memory
//! update. The set of tracked addresses is republished on a watch channel
//! whenever it changes so the Hyperliquid feed manager can reconcile its
//! connections.

use crate::events::CanonicalEvent;
use hypertrack_sdk::{Address, FilterSpec, FilterSpecError, Scope, SubscriberId};
use kanau::processor::Processor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("address limit of {limit} reached")]
    AddressLimit { limit: usize },

    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterSpecError),
}

/// One registration of a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub scope: Scope,
    /// Replaced wholesale on update, never mutated in place.
    pub filter: Arc<FilterSpec>,
    pub active: bool,
}

/// Serializable form of the whole registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub subscriber: SubscriberId,
    pub scope: Scope,
    #[serde(default)]
    pub filter: FilterSpec,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default)]
struct RegistryState {
    addresses: HashMap<Address, Vec<Subscriber>>,
    liquidations: Vec<Subscriber>,
}

impl RegistryState {
    fn list_mut(&mut self, scope: &Scope) -> Option<&mut Vec<Subscriber>> {
        match scope {
            Scope::Global => Some(&mut self.liquidations),
            Scope::Address(address) => self.addresses.get_mut(address),
        }
    }

    fn all_mut(&mut self) -> impl Iterator<Item = &mut Subscriber> {
        self.addresses
            .values_mut()
            .flatten()
            .chain(self.liquidations.iter_mut())
    }

    fn tracked(&self) -> Vec<Address> {
        let mut tracked: Vec<Address> = self.addresses.keys().cloned().collect();
        tracked.sort();
        tracked
    }
}

/// Shared handle to the registry. Cloning is cheap.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    state: Arc<RwLock<RegistryState>>,
    tracked_tx: Arc<watch::Sender<Vec<Address>>>,
    max_addresses: usize,
}

impl SubscriptionRegistry {
    /// Create an empty registry tracking at most `max_addresses` distinct
    /// addresses.
    pub fn new(max_addresses: usize) -> Self {
        let (tracked_tx, _) = watch::channel(Vec::new());
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
            tracked_tx: Arc::new(tracked_tx),
            max_addresses,
        }
    }

    /// Receiver for the sorted set of tracked addresses.
    pub fn tracked_addresses(&self) -> watch::Receiver<Vec<Address>> {
        self.tracked_tx.subscribe()
    }

    /// Register `id` under `scope`. Returns `false` if the pair already
    /// existed, in which case nothing changes.
    pub async fn subscribe(
        &self,
        scope: Scope,
        id: SubscriberId,
        filter: FilterSpec,
    ) -> Result<bool, RegistryError> {
        let filter = Arc::new(filter.normalized()?);
        let mut state = self.state.write().await;

        if let Scope::Address(address) = &scope {
            if !state.addresses.contains_key(address) && state.addresses.len() >= self.max_addresses
            {
                return Err(RegistryError::AddressLimit {
                    limit: self.max_addresses,
                });
            }
        }

        let list = match &scope {
            Scope::Global => &mut state.liquidations,
            Scope::Address(address) => state.addresses.entry(address.clone()).or_default(),
        };
        if list.iter().any(|s| s.id == id) {
            return Ok(false);
        }
        list.push(Subscriber {
            id,
            scope: scope.clone(),
            filter,
            active: true,
        });
        info!(subscriber = %id, %scope, "Subscribed");

        if matches!(scope, Scope::Address(_)) {
            self.publish_tracked(&state);
        }
        Ok(true)
    }

    /// Remove `id` from `scope`. Returns `false` if it was not registered.
    pub async fn unsubscribe(&self, scope: &Scope, id: SubscriberId) -> bool {
        let mut state = self.state.write().await;
        let Some(list) = state.list_mut(scope) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = list.len() != before;
        let now_empty = list.is_empty();

        if let Scope::Address(address) = scope {
            if now_empty {
                state.addresses.remove(address);
                self.publish_tracked(&state);
            }
        }
        if removed {
            info!(subscriber = %id, %scope, "Unsubscribed");
        }
        removed
    }

    /// Replace the filter of `id` under `scope`, or under every scope when
    /// `scope` is `None`. Returns the number of registrations updated.
    pub async fn update_filter(
        &self,
        id: SubscriberId,
        scope: Option<&Scope>,
        filter: FilterSpec,
    ) -> Result<usize, RegistryError> {
        let filter = Arc::new(filter.normalized()?);
        let mut state = self.state.write().await;
        let mut updated = 0;
        for subscriber in state.all_mut() {
            if subscriber.id == id && scope.is_none_or(|s| *s == subscriber.scope) {
                subscriber.filter = Arc::clone(&filter);
                updated += 1;
            }
        }
        debug!(subscriber = %id, updated, "Filter replaced");
        Ok(updated)
    }

    /// Suppress deliveries to every registration of `id`.
    pub async fn mark_inactive(&self, id: SubscriberId) -> usize {
        self.set_active(id, false).await
    }

    /// Undo [`mark_inactive`](Self::mark_inactive).
    pub async fn reactivate(&self, id: SubscriberId) -> usize {
        self.set_active(id, true).await
    }

    /// `false` once every registration of `id` has been marked inactive.
    /// A subscriber with no registrations left is not considered inactive.
    pub async fn is_active(&self, id: SubscriberId) -> bool {
        let state = self.state.read().await;
        let mut registrations = state
            .addresses
            .values()
            .flatten()
            .chain(state.liquidations.iter())
            .filter(|s| s.id == id)
            .peekable();
        registrations.peek().is_none() || registrations.any(|s| s.active)
    }

    async fn set_active(&self, id: SubscriberId, active: bool) -> usize {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for subscriber in state.all_mut().filter(|s| s.id == id) {
            if subscriber.active != active {
                subscriber.active = active;
                changed += 1;
            }
        }
        if changed > 0 {
            info!(subscriber = %id, active, "Subscriber activity changed");
        }
        changed
    }

    /// Registrations an event may be routed to: the address's list for
    /// account events, the global list for liquidations.
    pub async fn candidates(&self, event: &CanonicalEvent) -> Vec<Subscriber> {
        let state = self.state.read().await;
        match event {
            CanonicalEvent::Liquidation(_) => state.liquidations.clone(),
            _ => event
                .account()
                .and_then(|address| state.addresses.get(address))
                .cloned()
                .unwrap_or_default(),
        }
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.read().await;
        let mut subscriptions: Vec<SubscriptionRecord> = state
            .addresses
            .values()
            .flatten()
            .chain(state.liquidations.iter())
            .map(|s| SubscriptionRecord {
                subscriber: s.id,
                scope: s.scope.clone(),
                filter: (*s.filter).clone(),
                active: s.active,
            })
            .collect();
        subscriptions.sort_by(|a, b| {
            (a.scope.to_string(), a.subscriber).cmp(&(b.scope.to_string(), b.subscriber))
        });
        RegistrySnapshot { subscriptions }
    }

    /// Load a snapshot on top of the current state. Records that violate
    /// the address limit or carry an invalid filter are skipped and
    /// returned.
    pub async fn restore(
        &self,
        snapshot: RegistrySnapshot,
    ) -> Vec<(SubscriptionRecord, RegistryError)> {
        let mut skipped = Vec::new();
        for record in snapshot.subscriptions {
            match self
                .subscribe(record.scope.clone(), record.subscriber, record.filter.clone())
                .await
            {
                Ok(_) => {
                    if !record.active {
                        self.mark_inactive(record.subscriber).await;
                    }
                }
                Err(e) => skipped.push((record, e)),
            }
        }
        skipped
    }

    fn publish_tracked(&self, state: &RegistryState) {
        let tracked = state.tracked();
        self.tracked_tx.send_if_modified(|current| {
            if *current == tracked {
                false
            } else {
                *current = tracked;
                true
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SubscribeAddress {
    pub address: Address,
    pub subscriber: SubscriberId,
    pub filter: FilterSpec,
}

#[derive(Debug, Clone)]
pub struct UnsubscribeAddress {
    pub address: Address,
    pub subscriber: SubscriberId,
}

#[derive(Debug, Clone)]
pub struct EnableLiquidationMonitoring {
    pub subscriber: SubscriberId,
    pub filter: FilterSpec,
}

#[derive(Debug, Clone)]
pub struct DisableLiquidationMonitoring {
    pub subscriber: SubscriberId,
}

#[derive(Debug, Clone)]
pub struct UpdateFilter {
    pub subscriber: SubscriberId,
    /// `None` replaces the filter of every registration of the subscriber.
    pub scope: Option<Scope>,
    pub filter: FilterSpec,
}

#[derive(Debug, Clone)]
pub struct Reactivate {
    pub subscriber: SubscriberId,
}

impl Processor<SubscribeAddress> for SubscriptionRegistry {
    type Output = bool;
    type Error = RegistryError;
    #[tracing::instrument(skip_all, err, name = "Registry:SubscribeAddress")]
    async fn process(&self, cmd: SubscribeAddress) -> Result<bool, RegistryError> {
        self.subscribe(Scope::Address(cmd.address), cmd.subscriber, cmd.filter)
            .await
    }
}

impl Processor<UnsubscribeAddress> for SubscriptionRegistry {
    type Output = bool;
    type Error = std::convert::Infallible;
    async fn process(&self, cmd: UnsubscribeAddress) -> Result<bool, std::convert::Infallible> {
        Ok(self
            .unsubscribe(&Scope::Address(cmd.address), cmd.subscriber)
            .await)
    }
}

impl Processor<EnableLiquidationMonitoring> for SubscriptionRegistry {
    type Output = bool;
    type Error = RegistryError;
    #[tracing::instrument(skip_all, err, name = "Registry:EnableLiquidationMonitoring")]
    async fn process(&self, cmd: EnableLiquidationMonitoring) -> Result<bool, RegistryError> {
        self.subscribe(Scope::Global, cmd.subscriber, cmd.filter).await
    }
}

impl Processor<DisableLiquidationMonitoring> for SubscriptionRegistry {
    type Output = bool;
    type Error = std::convert::Infallible;
    async fn process(
        &self,
        cmd: DisableLiquidationMonitoring,
    ) -> Result<bool, std::convert::Infallible> {
        Ok(self.unsubscribe(&Scope::Global, cmd.subscriber).await)
    }
}

impl Processor<UpdateFilter> for SubscriptionRegistry {
    type Output = usize;
    type Error = RegistryError;
    #[tracing::instrument(skip_all, err, name = "Registry:UpdateFilter")]
    async fn process(&self, cmd: UpdateFilter) -> Result<usize, RegistryError> {
        self.update_filter(cmd.subscriber, cmd.scope.as_ref(), cmd.filter)
            .await
    }
}

impl Processor<Reactivate> for SubscriptionRegistry {
    type Output = usize;
    type Error = std::convert::Infallible;
    async fn process(&self, cmd: Reactivate) -> Result<usize, std::convert::Infallible> {
        Ok(self.reactivate(cmd.subscriber).await)
    }
}
