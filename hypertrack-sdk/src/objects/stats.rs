use serde::{Deserialize, Serialize};

use super::venues::Venue;

/// Per-venue counters for the current one-hour window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub venue: Venue,
    pub total_received: u64,
    pub total_sent: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub window_start: time::OffsetDateTime,
}

impl StatsSnapshot {
    /// Events received in the window that produced no delivery.
    pub fn filtered_out(&self) -> u64 {
        self.total_received.saturating_sub(self.total_sent)
    }
}
