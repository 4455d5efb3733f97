//! Dispatcher processor.
//!
//! The Dispatcher is responsible for:
//! - Draining the merged event bus, one event at a time, so per-venue order
//!   is kept through filter evaluation
//! - Counting every event as received, whatever the filter outcome
//! - Evaluating each active candidate's filter and emitting one
//!   `DeliveryJob` per passing subscriber
//! - Flushing the bus for a bounded grace period on shutdown

use crate::events::{CanonicalEvent, DeliveryJob, DeliveryJobSender, EventBus, SendReceipt};
use crate::stats::StatsAggregator;
use crate::subscriptions::{SubscriptionRegistry, check};
use crate::utils::formatting::render;
use kanau::processor::Processor;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("delivery queue closed")]
    DeliveryClosed,
}

pub struct Dispatcher {
    registry: SubscriptionRegistry,
    stats: StatsAggregator,
    delivery_tx: DeliveryJobSender,
    drain_grace: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: SubscriptionRegistry,
        stats: StatsAggregator,
        delivery_tx: DeliveryJobSender,
        drain_grace: Duration,
    ) -> Self {
        Self {
            registry,
            stats,
            delivery_tx,
            drain_grace,
        }
    }

    /// Run until shutdown, then drain the bus for at most the grace period.
    ///
    /// Dropping the dispatcher at the end closes the delivery queue, which
    /// lets the delivery worker finish.
    pub async fn run(self, mut bus: EventBus, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Dispatcher started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Dispatcher received shutdown signal");
                        break;
                    }
                }

                Some((venue, event)) = bus.recv() => {
                    if let Err(e) = self.process(event).await {
                        error!(%venue, error = %e, "Failed to dispatch event");
                        break;
                    }
                }

                else => {
                    info!("Event bus closed");
                    break;
                }
            }
        }

        bus.close();
        let deadline = Instant::now() + self.drain_grace;
        let mut drained = 0usize;
        // The deadline also bounds sends blocked on a full delivery queue.
        let drain = async {
            while let Some((_, event)) = bus.recv().await {
                if self.process(event).await.is_err() {
                    break;
                }
                drained += 1;
            }
        };
        if tokio::time::timeout_at(deadline, drain).await.is_err() {
            warn!("Drain grace elapsed, discarding buffered events");
        }

        info!(drained, "Dispatcher shutdown complete");
    }
}

impl Processor<CanonicalEvent> for Dispatcher {
    /// Number of delivery jobs emitted.
    type Output = usize;
    type Error = DispatchError;

    async fn process(&self, event: CanonicalEvent) -> Result<usize, DispatchError> {
        let venue = event.venue();
        self.stats.record_received(venue).await;

        let candidates = self.registry.candidates(&event).await;
        let receipt = SendReceipt::new(venue);
        let mut text: Option<Arc<str>> = None;
        let mut emitted = 0;

        for subscriber in candidates {
            if !subscriber.active {
                debug!(subscriber = %subscriber.id, "Skipping inactive subscriber");
                continue;
            }
            if let Err(rejection) = check(&event, &subscriber.scope, &subscriber.filter) {
                debug!(
                    %venue,
                    subscriber = %subscriber.id,
                    kind = event.kind_name(),
                    %rejection,
                    "Filtered out"
                );
                continue;
            }
            let text = text.get_or_insert_with(|| render(&event).into());
            self.delivery_tx
                .send(DeliveryJob::new(
                    subscriber.id,
                    Arc::clone(text),
                    Arc::clone(&receipt),
                ))
                .await
                .map_err(|_| DispatchError::DeliveryClosed)?;
            emitted += 1;
        }

        debug!(%venue, kind = event.kind_name(), emitted, "Event dispatched");
        Ok(emitted)
    }
}
