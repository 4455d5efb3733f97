//! Venue adapters.
//!
//! An adapter knows one venue's wire protocol: where to connect, what to
//! send after connecting, how to keep the stream alive and how to turn a
//! text frame into [`CanonicalEvent`]s. The socket itself is owned by the
//! [`ConnectionSupervisor`](crate::processors::ConnectionSupervisor), so
//! adapters stay pure and are tested on literal frames.

pub mod binance;
pub mod bybit;
pub mod gateio;
pub mod hyperliquid;

pub use binance::BinanceAdapter;
pub use bybit::BybitAdapter;
pub use gateio::GateIoAdapter;
pub use hyperliquid::HyperliquidAdapter;

use crate::events::CanonicalEvent;
use compact_str::CompactString;
use hypertrack_sdk::Venue;
use rust_decimal::Decimal;
use serde::Deserialize;
use smallvec::SmallVec;
use std::str::FromStr;
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

/// Events produced by one frame. Most frames carry a single record.
pub type FrameEvents = SmallVec<[CanonicalEvent; 1]>;

/// Classification of one inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Subscription confirmed.
    Ack,
    /// Subscription refused by the venue.
    Rejected(String),
    /// Pong or other keep-alive traffic.
    Heartbeat,
    Events(FrameEvents),
    /// Well-formed but irrelevant (snapshots, other channels).
    Ignored,
}

/// How the supervisor keeps an idle stream alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heartbeat {
    /// Protocol-level WebSocket ping.
    Ping,
    /// Application-level JSON ping.
    Text(String),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid number in `{field}`: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("unknown side `{0}`")]
    UnknownSide(String),

    #[error("invalid timestamp {0}")]
    InvalidTimestamp(i64),

    #[error("invalid address: {0}")]
    InvalidAddress(#[from] hypertrack_sdk::AddressParseError),
}

/// One venue's wire protocol.
pub trait VenueAdapter: Send + Sync + 'static {
    fn venue(&self) -> Venue;

    /// Distinguishes several connections to the same venue in logs and
    /// health reports.
    fn label(&self) -> String {
        self.venue().as_str().to_string()
    }

    fn endpoint(&self) -> &Url;

    /// Messages to send right after connecting, in order. Each one is
    /// expected to be confirmed by an [`Frame::Ack`].
    fn handshake(&self) -> Vec<String>;

    fn heartbeat(&self) -> Heartbeat;

    /// Parse one text frame. Records inside a batch that fail to parse are
    /// skipped individually; an error means the whole frame was unusable.
    fn parse(&self, text: &str) -> Result<Frame, ParseError>;
}

impl Frame {
    pub fn single(event: CanonicalEvent) -> Self {
        let mut events = FrameEvents::new();
        events.push(event);
        Frame::Events(events)
    }

    /// `Events` with no records collapses to `Ignored`.
    pub fn from_events(events: FrameEvents) -> Self {
        if events.is_empty() {
            Frame::Ignored
        } else {
            Frame::Events(events)
        }
    }
}

/// Venues send amounts as strings or as bare JSON numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireNumber {
    Text(CompactString),
    Number(serde_json::Number),
}

impl WireNumber {
    pub(crate) fn to_decimal(&self, field: &'static str) -> Result<Decimal, ParseError> {
        match self {
            WireNumber::Text(s) => parse_decimal(field, s),
            WireNumber::Number(n) => parse_decimal(field, &n.to_string()),
        }
    }
}

pub(crate) fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, ParseError> {
    let value = value.trim();
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|_| ParseError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

pub(crate) fn timestamp_ms(ms: i64) -> Result<OffsetDateTime, ParseError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|_| ParseError::InvalidTimestamp(ms))
}
