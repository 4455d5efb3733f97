//! Reconnect backoff for venue connections.

use std::time::Duration;

/// First delay after a failure.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound for any delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Multiplier applied once to the current delay for network-level failures.
const NETWORK_FAILURE_MULTIPLIER: u32 = 4;

/// How a connection attempt failed, as far as backoff is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Generic,
    /// DNS resolution or unreachable network. These tend to last longer.
    Network,
}

/// Exponential backoff: 1s, 2s, 4s, ... capped at 60s.
///
/// A [`FailureKind::Network`] failure waits four times the current delay for
/// that one attempt only; the stored progression keeps doubling from the
/// unmultiplied value.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    consecutive_failures: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial.min(max),
            consecutive_failures: 0,
        }
    }

    /// Delay to wait before the next attempt, advancing the progression.
    pub fn next_delay(&mut self, kind: FailureKind) -> Duration {
        let base = self.current;
        let delay = match kind {
            FailureKind::Generic => base,
            FailureKind::Network => base.saturating_mul(NETWORK_FAILURE_MULTIPLIER).min(self.max),
        };
        self.current = base.saturating_mul(2).min(self.max);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        delay
    }

    /// Called after the connection stayed subscribed long enough.
    pub fn reset(&mut self) {
        self.current = self.initial.min(self.max);
        self.consecutive_failures = 0;
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}
