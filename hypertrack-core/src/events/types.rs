//! Canonical event model.
//!
//! Every venue adapter normalizes its wire format into a [`CanonicalEvent`].
//! Events are immutable once built; the jobs fanned out from one event share
//! its rendered text and a [`SendReceipt`].

use compact_str::CompactString;
use hypertrack_sdk::{Address, Direction, NotificationType, OrderType, SubscriberId, Venue};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use uuid::Uuid;

/// USD value of a position or transfer. Never negative.
pub fn notional(size: Decimal, price: Decimal) -> Decimal {
    (size * price).abs()
}

/// A forced close-out reported by a venue.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationEvent {
    pub venue: Venue,
    pub pair: CompactString,
    /// Side of the position that was liquidated.
    pub direction: Direction,
    pub size: Decimal,
    pub notional_usd: Decimal,
    pub price: Decimal,
    pub address: Option<Address>,
    pub tx_hash: Option<CompactString>,
    pub timestamp: OffsetDateTime,
}

/// A trade executed by a tracked account.
#[derive(Debug, Clone, PartialEq)]
pub struct FillEvent {
    pub address: Address,
    pub asset: CompactString,
    pub direction: Direction,
    pub size: Decimal,
    pub price: Decimal,
    pub notional_usd: Decimal,
    pub order_type: OrderType,
    pub timestamp: OffsetDateTime,
    /// Open, Close or Liquidation.
    pub kind: NotificationType,
    /// Venue-provided action label such as "Open Long" or "Close Short".
    pub action: Option<CompactString>,
    pub start_position: Option<Decimal>,
    pub closed_pnl: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub tx_hash: Option<CompactString>,
}

/// A funding payment on a tracked account's position.
#[derive(Debug, Clone, PartialEq)]
pub struct FundingEvent {
    pub address: Address,
    pub asset: CompactString,
    pub direction: Direction,
    pub position_size: Decimal,
    /// Signed USDC amount; negative when the account paid.
    pub amount_usd: Decimal,
    pub funding_rate: Decimal,
    pub notional_usd: Decimal,
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepositEvent {
    pub address: Address,
    pub asset: CompactString,
    pub amount_usd: Decimal,
    pub tx_hash: Option<CompactString>,
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalEvent {
    pub address: Address,
    pub asset: CompactString,
    pub amount_usd: Decimal,
    pub fee: Option<Decimal>,
    pub tx_hash: Option<CompactString>,
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwapStatus {
    Activated,
    Terminated,
}

impl TwapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TwapStatus::Activated => "activated",
            TwapStatus::Terminated => "terminated",
        }
    }
}

/// A TWAP order of a tracked account that started or was stopped.
///
/// Slice fills are not reported; they arrive as ordinary fills.
#[derive(Debug, Clone, PartialEq)]
pub struct TwapEvent {
    pub address: Address,
    pub asset: CompactString,
    pub direction: Direction,
    /// Total order size.
    pub size: Decimal,
    pub executed_size: Decimal,
    pub executed_notional_usd: Decimal,
    pub minutes: u32,
    pub reduce_only: bool,
    pub randomize: bool,
    pub twap_id: Option<u64>,
    pub status: TwapStatus,
    pub timestamp: OffsetDateTime,
}

/// The normalized, venue-agnostic event.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalEvent {
    Liquidation(LiquidationEvent),
    Fill(FillEvent),
    Funding(FundingEvent),
    Deposit(DepositEvent),
    Withdrawal(WithdrawalEvent),
    Twap(TwapEvent),
}

impl CanonicalEvent {
    /// Venue whose stream produced this event.
    pub fn venue(&self) -> Venue {
        match self {
            CanonicalEvent::Liquidation(e) => e.venue,
            // Account events only come from the Hyperliquid user stream.
            _ => Venue::Hyperliquid,
        }
    }

    pub fn notional_usd(&self) -> Decimal {
        match self {
            CanonicalEvent::Liquidation(e) => e.notional_usd,
            CanonicalEvent::Fill(e) => e.notional_usd,
            CanonicalEvent::Funding(e) => e.notional_usd,
            CanonicalEvent::Deposit(e) => e.amount_usd.abs(),
            CanonicalEvent::Withdrawal(e) => e.amount_usd.abs(),
            CanonicalEvent::Twap(e) => e.executed_notional_usd,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            CanonicalEvent::Liquidation(e) => Some(e.direction),
            CanonicalEvent::Fill(e) => Some(e.direction),
            CanonicalEvent::Funding(e) => Some(e.direction),
            CanonicalEvent::Twap(e) => Some(e.direction),
            CanonicalEvent::Deposit(_) | CanonicalEvent::Withdrawal(_) => None,
        }
    }

    /// Pair for liquidations, asset for account events.
    pub fn instrument(&self) -> &str {
        match self {
            CanonicalEvent::Liquidation(e) => &e.pair,
            CanonicalEvent::Fill(e) => &e.asset,
            CanonicalEvent::Funding(e) => &e.asset,
            CanonicalEvent::Deposit(e) => &e.asset,
            CanonicalEvent::Withdrawal(e) => &e.asset,
            CanonicalEvent::Twap(e) => &e.asset,
        }
    }

    /// Account the event belongs to. Liquidations may carry one too, but it
    /// is informational and never used for routing.
    pub fn account(&self) -> Option<&Address> {
        match self {
            CanonicalEvent::Liquidation(_) => None,
            CanonicalEvent::Fill(e) => Some(&e.address),
            CanonicalEvent::Funding(e) => Some(&e.address),
            CanonicalEvent::Deposit(e) => Some(&e.address),
            CanonicalEvent::Withdrawal(e) => Some(&e.address),
            CanonicalEvent::Twap(e) => Some(&e.address),
        }
    }

    /// Notification kind for account events; `None` for venue liquidations.
    pub fn notification_type(&self) -> Option<NotificationType> {
        match self {
            CanonicalEvent::Liquidation(_) => None,
            CanonicalEvent::Fill(e) => Some(e.kind),
            CanonicalEvent::Funding(_) => Some(NotificationType::Funding),
            CanonicalEvent::Deposit(_) => Some(NotificationType::Deposit),
            CanonicalEvent::Withdrawal(_) => Some(NotificationType::Withdrawal),
            CanonicalEvent::Twap(_) => Some(NotificationType::Twap),
        }
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        match self {
            CanonicalEvent::Liquidation(e) => e.timestamp,
            CanonicalEvent::Fill(e) => e.timestamp,
            CanonicalEvent::Funding(e) => e.timestamp,
            CanonicalEvent::Deposit(e) => e.timestamp,
            CanonicalEvent::Withdrawal(e) => e.timestamp,
            CanonicalEvent::Twap(e) => e.timestamp,
        }
    }

    fn timestamp_mut(&mut self) -> &mut OffsetDateTime {
        match self {
            CanonicalEvent::Liquidation(e) => &mut e.timestamp,
            CanonicalEvent::Fill(e) => &mut e.timestamp,
            CanonicalEvent::Funding(e) => &mut e.timestamp,
            CanonicalEvent::Deposit(e) => &mut e.timestamp,
            CanonicalEvent::Withdrawal(e) => &mut e.timestamp,
            CanonicalEvent::Twap(e) => &mut e.timestamp,
        }
    }

    /// Raise the timestamp to `floor` if it is earlier. Returns the
    /// resulting timestamp.
    pub fn clamp_timestamp(&mut self, floor: OffsetDateTime) -> OffsetDateTime {
        let timestamp = self.timestamp_mut();
        if *timestamp < floor {
            *timestamp = floor;
        }
        *timestamp
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            CanonicalEvent::Liquidation(_) => "liquidation",
            CanonicalEvent::Fill(_) => "fill",
            CanonicalEvent::Funding(_) => "funding",
            CanonicalEvent::Deposit(_) => "deposit",
            CanonicalEvent::Withdrawal(_) => "withdrawal",
            CanonicalEvent::Twap(_) => "twap",
        }
    }
}

/// Shared between all delivery jobs fanned out from one event.
///
/// The first successful delivery flips it, so the event counts as sent
/// exactly once no matter how many subscribers it reached.
#[derive(Debug)]
pub struct SendReceipt {
    venue: Venue,
    delivered: AtomicBool,
}

impl SendReceipt {
    pub fn new(venue: Venue) -> Arc<Self> {
        Arc::new(Self {
            venue,
            delivered: AtomicBool::new(false),
        })
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// Returns `true` only for the first call.
    pub fn mark_delivered(&self) -> bool {
        self.delivered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }
}

/// One rendered message for one subscriber.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    /// Correlates log lines of the same message across retries.
    pub id: Uuid,
    pub subscriber: SubscriberId,
    pub text: Arc<str>,
    pub receipt: Arc<SendReceipt>,
    /// Number of times this job was re-enqueued after a rate-limit response.
    pub rate_limit_retries: u32,
}

impl DeliveryJob {
    pub fn new(subscriber: SubscriberId, text: impl Into<Arc<str>>, receipt: Arc<SendReceipt>) -> Self {
        Self {
            id: Uuid::now_v7(),
            subscriber,
            text: text.into(),
            receipt,
            rate_limit_retries: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notional_is_never_negative() {
        assert_eq!(
            notional(Decimal::from(-2), Decimal::from(100)),
            Decimal::from(200)
        );
    }

    #[test]
    fn test_receipt_counts_first_delivery_only() {
        let receipt = SendReceipt::new(Venue::Bybit);
        assert!(!receipt.is_delivered());
        assert!(receipt.mark_delivered());
        assert!(!receipt.mark_delivered());
        assert!(receipt.is_delivered());
    }

    #[test]
    fn test_clamp_timestamp_only_raises() {
        let t0 = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let mut event = CanonicalEvent::Liquidation(LiquidationEvent {
            venue: Venue::Binance,
            pair: "BTCUSDT".into(),
            direction: Direction::Long,
            size: Decimal::ONE,
            notional_usd: Decimal::ONE,
            price: Decimal::ONE,
            address: None,
            tx_hash: None,
            timestamp: t0,
        });
        let later = t0 + time::Duration::seconds(4);
        assert_eq!(event.clamp_timestamp(later), later);
        assert_eq!(event.timestamp(), later);
        assert_eq!(event.clamp_timestamp(t0), later);
    }
}
