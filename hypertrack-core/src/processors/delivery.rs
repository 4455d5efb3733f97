//! DeliveryWorker processor.
//!
//! The DeliveryWorker is responsible for:
//! - Receiving `DeliveryJob`s from the bounded delivery queue
//! - Spacing sends by a minimum interval shared across all subscribers
//! - Bounding the number of sends in flight
//! - Re-enqueueing a rate-limited job once its retry-after has elapsed,
//!   a bounded number of times
//! - Marking a subscriber inactive on a permanent rejection, and dropping
//!   its queued and retrying jobs from then on
//! - Counting an event as sent on its first successful delivery

use crate::events::{DeliveryJob, DeliveryJobReceiver};
use crate::stats::StatsAggregator;
use crate::subscriptions::SubscriptionRegistry;
use async_trait::async_trait;
use hypertrack_sdk::SubscriberId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one send attempt, as reported by the messaging channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Success,
    RateLimited { retry_after: Duration },
    /// The recipient blocked the bot or no longer exists.
    PermanentFailure(String),
    TransientFailure(String),
}

/// Outbound messaging channel.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, subscriber: SubscriberId, text: &str) -> DeliveryResult;
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Minimum spacing between the starts of two sends.
    pub min_send_interval: Duration,
    pub max_concurrency: usize,
    /// How often one job may be re-enqueued after a rate-limit response.
    pub max_rate_limit_retries: u32,
    /// Time allowed to flush the queue after shutdown is signalled.
    pub drain_grace: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            min_send_interval: Duration::from_millis(50),
            max_concurrency: 4,
            max_rate_limit_retries: 3,
            drain_grace: Duration::from_secs(5),
        }
    }
}

/// Hands out send slots at least `interval` apart.
struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

/// State shared by the worker loop and the send tasks it spawns.
struct DeliveryContext {
    notifier: Arc<dyn Notifier>,
    registry: SubscriptionRegistry,
    stats: StatsAggregator,
    limiter: RateLimiter,
    max_rate_limit_retries: u32,
    /// Weak so that the queue closes once every producer is gone.
    requeue_tx: mpsc::WeakSender<DeliveryJob>,
}

pub struct DeliveryWorker {
    ctx: Arc<DeliveryContext>,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    drain_grace: Duration,
}

impl DeliveryWorker {
    /// `requeue_tx` must point at the queue the worker consumes.
    pub fn new(
        notifier: Arc<dyn Notifier>,
        registry: SubscriptionRegistry,
        stats: StatsAggregator,
        config: DeliveryConfig,
        requeue_tx: mpsc::WeakSender<DeliveryJob>,
    ) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        Self {
            ctx: Arc::new(DeliveryContext {
                notifier,
                registry,
                stats,
                limiter: RateLimiter::new(config.min_send_interval),
                max_rate_limit_retries: config.max_rate_limit_retries,
                requeue_tx,
            }),
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            drain_grace: config.drain_grace,
        }
    }

    /// Run until shutdown, then flush what the grace period allows.
    pub async fn run(self, mut jobs_rx: DeliveryJobReceiver, mut shutdown_rx: watch::Receiver<bool>) {
        info!("DeliveryWorker started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("DeliveryWorker received shutdown signal");
                        break;
                    }
                }

                Some(job) = jobs_rx.recv() => {
                    self.dispatch(job, shutdown_rx.clone()).await;
                }

                else => {
                    info!("Delivery queue closed");
                    break;
                }
            }
        }

        let deadline = Instant::now() + self.drain_grace;
        let mut flushed = 0usize;
        loop {
            match tokio::time::timeout_at(deadline, jobs_rx.recv()).await {
                Ok(Some(job)) => {
                    self.dispatch(job, shutdown_rx.clone()).await;
                    flushed += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    jobs_rx.close();
                    let mut discarded = 0usize;
                    while jobs_rx.try_recv().is_ok() {
                        discarded += 1;
                    }
                    warn!(discarded, "Drain grace elapsed, discarding queued deliveries");
                    break;
                }
            }
        }

        // Wait for in-flight sends.
        let permits = u32::try_from(self.max_concurrency).unwrap_or(u32::MAX);
        if tokio::time::timeout_at(deadline, self.semaphore.acquire_many(permits))
            .await
            .is_err()
        {
            warn!("Drain grace elapsed with deliveries still in flight");
        }

        info!(flushed, "DeliveryWorker shutdown complete");
    }

    /// Wait for a free slot, then send in the background.
    async fn dispatch(&self, job: DeliveryJob, shutdown_rx: watch::Receiver<bool>) {
        let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
            return;
        };
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            let outcome = ctx.deliver(&job).await;
            drop(permit);
            if let Some(DeliveryResult::RateLimited { retry_after }) = outcome {
                ctx.schedule_retry(job, retry_after, shutdown_rx).await;
            }
        });
    }
}

impl DeliveryContext {
    /// `None` when the subscriber was marked inactive before the send.
    async fn deliver(&self, job: &DeliveryJob) -> Option<DeliveryResult> {
        self.limiter.acquire().await;
        if !self.registry.is_active(job.subscriber).await {
            debug!(job_id = %job.id, subscriber = %job.subscriber, "Subscriber inactive, dropping message");
            return None;
        }
        let result = self.notifier.send(job.subscriber, &job.text).await;
        match &result {
            DeliveryResult::Success => {
                if job.receipt.mark_delivered() {
                    self.stats.record_sent(job.receipt.venue()).await;
                }
                debug!(job_id = %job.id, subscriber = %job.subscriber, "Delivered");
            }
            DeliveryResult::RateLimited { retry_after } => {
                debug!(
                    job_id = %job.id,
                    subscriber = %job.subscriber,
                    retry_after_secs = retry_after.as_secs_f64(),
                    "Rate limited"
                );
            }
            DeliveryResult::PermanentFailure(reason) => {
                warn!(
                    job_id = %job.id,
                    subscriber = %job.subscriber,
                    reason = %reason,
                    "Recipient unreachable, marking subscriber inactive"
                );
                self.registry.mark_inactive(job.subscriber).await;
            }
            DeliveryResult::TransientFailure(reason) => {
                warn!(
                    job_id = %job.id,
                    subscriber = %job.subscriber,
                    reason = %reason,
                    "Delivery failed, dropping message"
                );
            }
        }
        Some(result)
    }

    async fn schedule_retry(
        &self,
        mut job: DeliveryJob,
        retry_after: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        if job.rate_limit_retries >= self.max_rate_limit_retries {
            warn!(
                job_id = %job.id,
                subscriber = %job.subscriber,
                retries = job.rate_limit_retries,
                "Rate-limit retries exhausted, dropping message"
            );
            return;
        }
        job.rate_limit_retries += 1;

        if *shutdown_rx.borrow() {
            return;
        }
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                debug!(job_id = %job.id, "Shutdown during retry-after, dropping message");
                return;
            }
            _ = tokio::time::sleep(retry_after) => {}
        }

        if !self.registry.is_active(job.subscriber).await {
            debug!(job_id = %job.id, subscriber = %job.subscriber, "Subscriber inactive, dropping retry");
            return;
        }

        let Some(tx) = self.requeue_tx.upgrade() else {
            debug!(job_id = %job.id, "Delivery queue closed, dropping retry");
            return;
        };
        if tx.send(job).await.is_err() {
            debug!("Delivery queue closed, dropping retry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{SendReceipt, delivery_job_channel};
    use hypertrack_sdk::{FilterSpec, Scope, Venue};
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    /// Replays scripted results, then succeeds.
    #[derive(Default)]
    struct ScriptedNotifier {
        script: StdMutex<VecDeque<DeliveryResult>>,
        calls: StdMutex<Vec<(SubscriberId, String, Instant)>>,
        notify: Notify,
    }

    impl ScriptedNotifier {
        fn new(script: impl IntoIterator<Item = DeliveryResult>) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script.into_iter().collect()),
                ..Default::default()
            })
        }

        fn calls(&self) -> Vec<(SubscriberId, String, Instant)> {
            self.calls.lock().unwrap().clone()
        }

        async fn wait_for_calls(&self, n: usize) {
            loop {
                if self.calls.lock().unwrap().len() >= n {
                    return;
                }
                self.notify.notified().await;
            }
        }
    }

    #[async_trait]
    impl Notifier for ScriptedNotifier {
        async fn send(&self, subscriber: SubscriberId, text: &str) -> DeliveryResult {
            let result = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(DeliveryResult::Success);
            self.calls
                .lock()
                .unwrap()
                .push((subscriber, text.to_string(), Instant::now()));
            self.notify.notify_one();
            result
        }
    }

    struct Harness {
        notifier: Arc<ScriptedNotifier>,
        registry: SubscriptionRegistry,
        stats: StatsAggregator,
        jobs_tx: mpsc::Sender<DeliveryJob>,
        shutdown_tx: watch::Sender<bool>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start(notifier: Arc<ScriptedNotifier>, config: DeliveryConfig) -> Harness {
        let registry = SubscriptionRegistry::new(10);
        let stats = StatsAggregator::new();
        let (jobs_tx, jobs_rx) = delivery_job_channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = DeliveryWorker::new(
            notifier.clone(),
            registry.clone(),
            stats.clone(),
            config,
            jobs_tx.downgrade(),
        );
        let handle = tokio::spawn(worker.run(jobs_rx, shutdown_rx));
        Harness {
            notifier,
            registry,
            stats,
            jobs_tx,
            shutdown_tx,
            handle,
        }
    }

    fn job(subscriber: i64, receipt: &Arc<SendReceipt>) -> DeliveryJob {
        DeliveryJob::new(SubscriberId(subscriber), "hello", Arc::clone(receipt))
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_message_is_redelivered_once_after_retry_after() {
        let notifier = ScriptedNotifier::new([DeliveryResult::RateLimited {
            retry_after: Duration::from_secs(30),
        }]);
        let h = start(notifier, DeliveryConfig::default());
        let receipt = SendReceipt::new(Venue::Binance);
        let start = Instant::now();

        h.jobs_tx.send(job(1, &receipt)).await.unwrap();
        h.notifier.wait_for_calls(1).await;
        assert_eq!(h.stats.get_stats(Venue::Binance).await.total_sent, 0);

        h.notifier.wait_for_calls(2).await;
        let calls = h.notifier.calls();
        assert!(calls[1].2 - start >= Duration::from_secs(30));
        assert_eq!(calls[1].1, "hello");
        // Let the success bookkeeping finish.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.stats.get_stats(Venue::Binance).await.total_sent, 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.notifier.calls().len(), 2);

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_are_bounded() {
        let limited = DeliveryResult::RateLimited {
            retry_after: Duration::from_secs(1),
        };
        let notifier = ScriptedNotifier::new(vec![limited; 10]);
        let config = DeliveryConfig {
            max_rate_limit_retries: 2,
            ..DeliveryConfig::default()
        };
        let h = start(notifier, config);
        let receipt = SendReceipt::new(Venue::Bybit);

        h.jobs_tx.send(job(1, &receipt)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        // First attempt plus two re-enqueues.
        assert_eq!(h.notifier.calls().len(), 3);
        assert!(!receipt.is_delivered());

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_marks_subscriber_inactive() {
        let notifier = ScriptedNotifier::new([DeliveryResult::PermanentFailure(
            "bot was blocked by the user".to_string(),
        )]);
        let h = start(notifier, DeliveryConfig::default());
        h.registry
            .subscribe(Scope::Global, SubscriberId(4), FilterSpec::default())
            .await
            .unwrap();
        let receipt = SendReceipt::new(Venue::GateIo);

        h.jobs_tx.send(job(4, &receipt)).await.unwrap();
        h.notifier.wait_for_calls(1).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let snapshot = h.registry.snapshot().await;
        assert!(!snapshot.subscriptions[0].active);
        assert_eq!(h.stats.get_stats(Venue::GateIo).await.total_sent, 0);

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_jobs_for_blocked_subscriber_are_not_sent() {
        let blocked = DeliveryResult::PermanentFailure("bot was blocked by the user".to_string());
        let notifier = ScriptedNotifier::new([blocked]);
        let h = start(notifier, DeliveryConfig::default());
        h.registry
            .subscribe(Scope::Global, SubscriberId(4), FilterSpec::default())
            .await
            .unwrap();
        h.registry
            .subscribe(Scope::Global, SubscriberId(5), FilterSpec::default())
            .await
            .unwrap();
        let receipt = SendReceipt::new(Venue::Binance);

        for _ in 0..3 {
            h.jobs_tx.send(job(4, &receipt)).await.unwrap();
        }
        h.jobs_tx.send(job(5, &receipt)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let calls = h.notifier.calls();
        let to_blocked = calls.iter().filter(|c| c.0 == SubscriberId(4)).count();
        assert_eq!(to_blocked, 1);
        // Other subscribers are unaffected.
        assert!(calls.iter().any(|c| c.0 == SubscriberId(5)));

        h.registry.reactivate(SubscriberId(4)).await;
        h.jobs_tx.send(job(4, &receipt)).await.unwrap();
        h.notifier.wait_for_calls(calls.len() + 1).await;

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_dropped_when_subscriber_goes_inactive() {
        let notifier = ScriptedNotifier::new([DeliveryResult::RateLimited {
            retry_after: Duration::from_secs(30),
        }]);
        let h = start(notifier, DeliveryConfig::default());
        h.registry
            .subscribe(Scope::Global, SubscriberId(7), FilterSpec::default())
            .await
            .unwrap();
        let receipt = SendReceipt::new(Venue::Bybit);

        h.jobs_tx.send(job(7, &receipt)).await.unwrap();
        h.notifier.wait_for_calls(1).await;
        h.registry.mark_inactive(SubscriberId(7)).await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.notifier.calls().len(), 1);
        assert!(!receipt.is_delivered());

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_dropped() {
        let notifier =
            ScriptedNotifier::new([DeliveryResult::TransientFailure("502".to_string())]);
        let h = start(notifier, DeliveryConfig::default());
        let receipt = SendReceipt::new(Venue::Binance);

        h.jobs_tx.send(job(1, &receipt)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.notifier.calls().len(), 1);
        assert!(!receipt.is_delivered());

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_are_spaced_and_counted_once_per_event() {
        let notifier = ScriptedNotifier::new([]);
        let config = DeliveryConfig {
            min_send_interval: Duration::from_secs(1),
            ..DeliveryConfig::default()
        };
        let h = start(notifier, config);
        let receipt = SendReceipt::new(Venue::Hyperliquid);

        for subscriber in 1..=3 {
            h.jobs_tx.send(job(subscriber, &receipt)).await.unwrap();
        }
        h.notifier.wait_for_calls(3).await;
        let calls = h.notifier.calls();
        assert!(calls[1].2 - calls[0].2 >= Duration::from_secs(1));
        assert!(calls[2].2 - calls[1].2 >= Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(1)).await;
        // Three deliveries of one event count as one sent event.
        assert_eq!(h.stats.get_stats(Venue::Hyperliquid).await.total_sent, 1);

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_queued_jobs() {
        let notifier = ScriptedNotifier::new([]);
        let h = start(notifier, DeliveryConfig::default());
        let receipt = SendReceipt::new(Venue::Binance);

        h.shutdown_tx.send(true).unwrap();
        h.jobs_tx.send(job(1, &receipt)).await.unwrap();
        h.jobs_tx.send(job(2, &receipt)).await.unwrap();
        drop(h.jobs_tx);
        h.handle.await.unwrap();
        assert_eq!(h.notifier.calls().len(), 2);
    }
}
