//! Event channel factories and handles.
//!
//! Each venue owns one bounded channel. The [`EventBus`] merges them so a
//! slow venue cannot starve the others, and a full channel blocks only the
//! producer that owns it.
//!
//! Timestamps leaving the bus never go backwards within one venue: an
//! event stamped earlier than its venue's previous event is raised to that
//! event's time. Several Hyperliquid connections share one venue channel,
//! so the floor is kept here rather than per connection.

use super::types::{CanonicalEvent, DeliveryJob};
use hypertrack_sdk::Venue;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::StreamMap;
use tokio_stream::wrappers::ReceiverStream;

/// Default buffer size for the delivery queue.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Default per-venue buffer size of the event bus.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Sender handle for one venue's events.
pub type VenueEventSender = mpsc::Sender<CanonicalEvent>;
/// Receiver handle for one venue's events.
pub type VenueEventReceiver = mpsc::Receiver<CanonicalEvent>;

/// Sender handle for delivery jobs.
pub type DeliveryJobSender = mpsc::Sender<DeliveryJob>;
/// Receiver handle for delivery jobs.
pub type DeliveryJobReceiver = mpsc::Receiver<DeliveryJob>;

/// Create a new delivery job channel.
pub fn delivery_job_channel(capacity: usize) -> (DeliveryJobSender, DeliveryJobReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Producer side of the bus, one sender per venue.
#[derive(Clone, Debug)]
pub struct BusSenders {
    senders: Vec<(Venue, VenueEventSender)>,
}

impl BusSenders {
    /// Sender for the given venue, if the bus carries it.
    pub fn sender(&self, venue: Venue) -> Option<VenueEventSender> {
        self.senders
            .iter()
            .find(|(v, _)| *v == venue)
            .map(|(_, tx)| tx.clone())
    }
}

/// Consumer side of the bus.
pub struct EventBus {
    streams: StreamMap<Venue, ReceiverStream<CanonicalEvent>>,
    last_timestamp: HashMap<Venue, OffsetDateTime>,
}

impl EventBus {
    /// Create one bounded channel per venue.
    pub fn new(capacity: usize, venues: impl IntoIterator<Item = Venue>) -> (BusSenders, Self) {
        let mut senders = Vec::new();
        let mut streams = StreamMap::new();
        for venue in venues {
            if senders.iter().any(|(v, _)| *v == venue) {
                continue;
            }
            let (tx, rx) = mpsc::channel(capacity.max(1));
            senders.push((venue, tx));
            streams.insert(venue, ReceiverStream::new(rx));
        }
        (
            BusSenders { senders },
            Self {
                streams,
                last_timestamp: HashMap::new(),
            },
        )
    }

    /// Next event from any venue.
    ///
    /// Returns `None` once every sender of every venue has been dropped and
    /// all buffered events were consumed.
    pub async fn recv(&mut self) -> Option<(Venue, CanonicalEvent)> {
        let (venue, mut event) = self.streams.next().await?;
        match self.last_timestamp.get_mut(&venue) {
            Some(last) => *last = event.clamp_timestamp(*last),
            None => {
                self.last_timestamp.insert(venue, event.timestamp());
            }
        }
        Some((venue, event))
    }

    /// Close all venue channels. Buffered events remain readable.
    pub fn close(&mut self) {
        for stream in self.streams.values_mut() {
            stream.close();
        }
    }
}
