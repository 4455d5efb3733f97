//! Per-venue, one-hour event counters.
//!
//! Windows roll lazily: any read or increment that finds its venue's window
//! older than [`WINDOW`] resets the counters and starts a new window at the
//! current time. There is no background reset task.

use hypertrack_sdk::{StatsSnapshot, Venue};
use kanau::processor::Processor;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

pub const WINDOW: Duration = Duration::hours(1);

#[derive(Debug, Clone, Copy)]
struct StatsWindow {
    total_received: u64,
    total_sent: u64,
    window_start: OffsetDateTime,
}

impl StatsWindow {
    fn new(now: OffsetDateTime) -> Self {
        Self {
            total_received: 0,
            total_sent: 0,
            window_start: now,
        }
    }

    fn roll(&mut self, now: OffsetDateTime) {
        if now - self.window_start >= WINDOW {
            *self = Self::new(now);
        }
    }
}

/// Shared handle; clones see the same counters.
#[derive(Clone, Default)]
pub struct StatsAggregator {
    windows: Arc<Mutex<HashMap<Venue, StatsWindow>>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one canonical event, whatever the filter outcome.
    pub async fn record_received(&self, venue: Venue) {
        self.record_received_at(venue, OffsetDateTime::now_utc()).await
    }

    /// Count one event that reached at least one subscriber.
    pub async fn record_sent(&self, venue: Venue) {
        self.record_sent_at(venue, OffsetDateTime::now_utc()).await
    }

    pub async fn get_stats(&self, venue: Venue) -> StatsSnapshot {
        self.get_stats_at(venue, OffsetDateTime::now_utc()).await
    }

    pub async fn record_received_at(&self, venue: Venue, now: OffsetDateTime) {
        let mut windows = self.windows.lock().await;
        let window = windows.entry(venue).or_insert_with(|| StatsWindow::new(now));
        window.roll(now);
        window.total_received += 1;
    }

    pub async fn record_sent_at(&self, venue: Venue, now: OffsetDateTime) {
        let mut windows = self.windows.lock().await;
        let window = windows.entry(venue).or_insert_with(|| StatsWindow::new(now));
        window.roll(now);
        window.total_sent += 1;
    }

    pub async fn get_stats_at(&self, venue: Venue, now: OffsetDateTime) -> StatsSnapshot {
        let mut windows = self.windows.lock().await;
        let window = windows.entry(venue).or_insert_with(|| StatsWindow::new(now));
        window.roll(now);
        StatsSnapshot {
            venue,
            total_received: window.total_received,
            total_sent: window.total_sent,
            window_start: window.window_start,
        }
    }
}

/// Query for one venue's current window.
#[derive(Debug, Clone, Copy)]
pub struct GetStats {
    pub venue: Venue,
}

impl Processor<GetStats> for StatsAggregator {
    type Output = StatsSnapshot;
    type Error = Infallible;
    async fn process(&self, query: GetStats) -> Result<StatsSnapshot, Infallible> {
        Ok(self.get_stats(query.venue).await)
    }
}
