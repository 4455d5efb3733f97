//! Connection health reporting.

use serde::{Deserialize, Serialize};

use super::venues::Venue;

/// Lifecycle of one supervised venue connection.
///
/// `Idle -> Connecting -> Subscribing -> Subscribed`, then on a drop
/// `Reconnecting -> Connecting -> ...`. `Closed` is only reached on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Subscribing,
    Subscribed,
    Reconnecting,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Subscribed => "subscribed",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a supervised connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionHealth {
    pub venue: Venue,
    /// Distinguishes connections of the same venue (e.g. one per address).
    pub label: String,
    pub state: ConnectionState,
    pub consecutive_failures: u32,
    pub backoff_secs: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_activity: Option<time::OffsetDateTime>,
}
