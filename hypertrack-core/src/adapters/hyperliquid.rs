//! Hyperliquid per-user account stream.
//!
//! `userEvents` frames do not say which user they belong to, so every
//! adapter instance serves exactly one address and stamps it on the events
//! it produces.
//!
//! TWAP orders are reported when they are activated or terminated. Slice
//! fills (`twapSliceFills`) are not forwarded.

use super::{
    Frame, FrameEvents, Heartbeat, ParseError, VenueAdapter, WireNumber, timestamp_ms,
};
use crate::events::{
    CanonicalEvent, DepositEvent, FillEvent, FundingEvent, LiquidationEvent, TwapEvent,
    TwapStatus, WithdrawalEvent, notional,
};
use compact_str::CompactString;
use hypertrack_sdk::{Address, Direction, NotificationType, OrderType, Venue};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use time::OffsetDateTime;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "wss://api.hyperliquid.xyz/ws";

/// Hyperliquid allows this many user subscriptions per IP.
pub const DEFAULT_MAX_ADDRESSES: usize = 10;

pub struct HyperliquidAdapter {
    endpoint: Url,
    address: Address,
}

impl HyperliquidAdapter {
    pub fn new(endpoint: Url, address: Address) -> Self {
        Self { endpoint, address }
    }

    fn parse_user_events(&self, data: serde_json::Value) -> Result<Frame, ParseError> {
        let data: UserEventData = serde_json::from_value(data)?;
        let mut events = FrameEvents::new();

        if let Some(fills) = data.fills {
            for fill in fills {
                match self.parse_fill(fill) {
                    Ok(event) => events.push(event),
                    Err(e) => warn!(address = %self.address, error = %e, "Skipping malformed fill"),
                }
            }
        }
        if let Some(funding) = data.funding {
            match self.parse_funding(funding) {
                Ok(event) => events.push(event),
                Err(e) => warn!(address = %self.address, error = %e, "Skipping malformed funding"),
            }
        }
        if let Some(liquidation) = data.liquidation {
            match self.parse_liquidation(liquidation) {
                Ok(event) => events.push(event),
                Err(e) => warn!(address = %self.address, error = %e, "Skipping malformed liquidation"),
            }
        }
        if let Some(history) = data.twap_history {
            for entry in history {
                match self.parse_twap(entry) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => {}
                    Err(e) => warn!(address = %self.address, error = %e, "Skipping malformed TWAP update"),
                }
            }
        }
        Ok(Frame::from_events(events))
    }

    fn parse_fill(&self, value: serde_json::Value) -> Result<CanonicalEvent, ParseError> {
        let fill: WireFill = serde_json::from_value(value)?;
        let direction = match fill.side.as_str() {
            "B" => Direction::Long,
            "A" => Direction::Short,
            other => return Err(ParseError::UnknownSide(other.to_string())),
        };
        let size = fill.sz.to_decimal("sz")?;
        let price = fill.px.to_decimal("px")?;
        let closed_pnl = fill
            .closed_pnl
            .as_ref()
            .map(|p| p.to_decimal("closedPnl"))
            .transpose()?;
        let kind = if fill.liquidation.is_some() {
            NotificationType::Liquidation
        } else if fill.dir.as_deref().is_some_and(|d| d.contains("Close"))
            || closed_pnl.is_some_and(|p| !p.is_zero())
        {
            NotificationType::Close
        } else {
            NotificationType::Open
        };
        let order_type = if fill.coin.starts_with('@') || fill.coin.contains('/') {
            OrderType::Spot
        } else {
            OrderType::Perp
        };

        Ok(CanonicalEvent::Fill(FillEvent {
            address: self.address.clone(),
            notional_usd: notional(size, price),
            asset: fill.coin,
            direction,
            size,
            price,
            order_type,
            timestamp: timestamp_ms(fill.time)?,
            kind,
            action: fill.dir,
            start_position: fill
                .start_position
                .as_ref()
                .map(|s| s.to_decimal("startPosition"))
                .transpose()?,
            closed_pnl,
            fee: fill.fee.as_ref().map(|f| f.to_decimal("fee")).transpose()?,
            tx_hash: fill.hash,
        }))
    }

    fn parse_funding(&self, value: serde_json::Value) -> Result<CanonicalEvent, ParseError> {
        let funding: WireFunding = serde_json::from_value(value)?;
        let position_size = funding.szi.to_decimal("szi")?;
        let amount_usd = funding.usdc.to_decimal("usdc")?;
        Ok(CanonicalEvent::Funding(FundingEvent {
            address: self.address.clone(),
            asset: funding.coin,
            direction: if position_size.is_sign_negative() {
                Direction::Short
            } else {
                Direction::Long
            },
            position_size,
            notional_usd: amount_usd.abs(),
            amount_usd,
            funding_rate: funding.funding_rate.to_decimal("fundingRate")?,
            timestamp: timestamp_ms(funding.time)?,
        }))
    }

    fn parse_liquidation(&self, value: serde_json::Value) -> Result<CanonicalEvent, ParseError> {
        let liquidation: WireLiquidation = serde_json::from_value(value)?;
        let position = liquidation.liquidated_ntl_pos.to_decimal("liquidated_ntl_pos")?;
        let address = match &liquidation.liquidated_user {
            Some(user) => Address::from_str(user)?,
            None => self.address.clone(),
        };
        Ok(CanonicalEvent::Liquidation(LiquidationEvent {
            venue: Venue::Hyperliquid,
            // Account-level liquidation; the venue does not name a market.
            pair: CompactString::const_new("CROSS"),
            direction: if position.is_sign_negative() {
                Direction::Short
            } else {
                Direction::Long
            },
            size: Decimal::ZERO,
            notional_usd: position.abs(),
            price: Decimal::ZERO,
            address: Some(address),
            tx_hash: None,
            timestamp: OffsetDateTime::now_utc(),
        }))
    }

    /// `None` for statuses other than activated and terminated.
    fn parse_twap(&self, value: serde_json::Value) -> Result<Option<CanonicalEvent>, ParseError> {
        let entry: WireTwapHistory = serde_json::from_value(value)?;
        let status = match entry.status.status.as_str() {
            "activated" => TwapStatus::Activated,
            "terminated" => TwapStatus::Terminated,
            other => {
                debug!(address = %self.address, status = other, "Skipping TWAP update");
                return Ok(None);
            }
        };
        let state = entry.state;
        let direction = match state.side.as_str() {
            "B" => Direction::Long,
            "A" => Direction::Short,
            other => return Err(ParseError::UnknownSide(other.to_string())),
        };
        let timestamp = match (state.timestamp, entry.time) {
            (Some(ms), _) => timestamp_ms(ms)?,
            (None, Some(secs)) => timestamp_ms(secs.saturating_mul(1_000))?,
            (None, None) => return Err(ParseError::MissingField("time")),
        };
        let zero_or = |n: Option<WireNumber>, field: &'static str| -> Result<Decimal, ParseError> {
            n.map_or(Ok(Decimal::ZERO), |n| n.to_decimal(field))
        };

        Ok(Some(CanonicalEvent::Twap(TwapEvent {
            address: self.address.clone(),
            asset: state.coin,
            direction,
            size: state.sz.to_decimal("sz")?,
            executed_size: zero_or(state.executed_sz, "executedSz")?,
            executed_notional_usd: zero_or(state.executed_ntl, "executedNtl")?.abs(),
            minutes: state.minutes,
            reduce_only: state.reduce_only,
            randomize: state.randomize,
            twap_id: entry.twap_id,
            status,
            timestamp,
        })))
    }

    fn parse_ledger(&self, data: serde_json::Value) -> Result<Frame, ParseError> {
        let data: LedgerData = serde_json::from_value(data)?;
        if data.is_snapshot {
            return Ok(Frame::Ignored);
        }
        let mut events = FrameEvents::new();
        for update in data.non_funding_ledger_updates {
            match self.parse_ledger_update(update) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => warn!(address = %self.address, error = %e, "Skipping malformed ledger update"),
            }
        }
        Ok(Frame::from_events(events))
    }

    fn parse_ledger_update(
        &self,
        value: serde_json::Value,
    ) -> Result<Option<CanonicalEvent>, ParseError> {
        let update: LedgerUpdate = serde_json::from_value(value)?;
        let timestamp = timestamp_ms(update.time)?;
        let asset = CompactString::const_new("USDC");
        let event = match update.delta.kind.as_str() {
            "deposit" => CanonicalEvent::Deposit(DepositEvent {
                address: self.address.clone(),
                asset,
                amount_usd: update.delta.usdc()?,
                tx_hash: update.hash,
                timestamp,
            }),
            "withdraw" => CanonicalEvent::Withdrawal(WithdrawalEvent {
                address: self.address.clone(),
                asset,
                amount_usd: update.delta.usdc()?,
                fee: update.delta.fee.as_ref().map(|f| f.to_decimal("fee")).transpose()?,
                tx_hash: update.hash,
                timestamp,
            }),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

#[derive(Debug, Deserialize)]
struct HyperliquidFrame {
    channel: Option<CompactString>,
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserEventData {
    fills: Option<Vec<serde_json::Value>>,
    funding: Option<serde_json::Value>,
    liquidation: Option<serde_json::Value>,
    twap_history: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTwapHistory {
    state: WireTwapState,
    status: WireTwapStatus,
    /// Seconds.
    time: Option<i64>,
    twap_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTwapState {
    coin: CompactString,
    side: CompactString,
    sz: WireNumber,
    executed_sz: Option<WireNumber>,
    executed_ntl: Option<WireNumber>,
    #[serde(default)]
    minutes: u32,
    #[serde(default)]
    reduce_only: bool,
    #[serde(default)]
    randomize: bool,
    /// Milliseconds.
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WireTwapStatus {
    status: CompactString,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFill {
    coin: CompactString,
    px: WireNumber,
    sz: WireNumber,
    side: CompactString,
    time: i64,
    start_position: Option<WireNumber>,
    dir: Option<CompactString>,
    closed_pnl: Option<WireNumber>,
    hash: Option<CompactString>,
    fee: Option<WireNumber>,
    liquidation: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFunding {
    time: i64,
    coin: CompactString,
    usdc: WireNumber,
    szi: WireNumber,
    funding_rate: WireNumber,
}

#[derive(Debug, Deserialize)]
struct WireLiquidation {
    liquidated_user: Option<String>,
    liquidated_ntl_pos: WireNumber,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerData {
    #[serde(default)]
    is_snapshot: bool,
    #[serde(default)]
    non_funding_ledger_updates: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct LedgerUpdate {
    time: i64,
    hash: Option<CompactString>,
    delta: LedgerDelta,
}

#[derive(Debug, Deserialize)]
struct LedgerDelta {
    #[serde(rename = "type")]
    kind: CompactString,
    usdc: Option<WireNumber>,
    fee: Option<WireNumber>,
}

impl LedgerDelta {
    fn usdc(&self) -> Result<Decimal, ParseError> {
        self.usdc
            .as_ref()
            .ok_or(ParseError::MissingField("usdc"))?
            .to_decimal("usdc")
    }
}

impl VenueAdapter for HyperliquidAdapter {
    fn venue(&self) -> Venue {
        Venue::Hyperliquid
    }

    fn label(&self) -> String {
        format!("hyperliquid:{}", self.address.short())
    }

    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn handshake(&self) -> Vec<String> {
        ["userEvents", "userNonFundingLedgerUpdates"]
            .iter()
            .map(|kind| {
                format!(
                    r#"{{"method":"subscribe","subscription":{{"type":"{kind}","user":"{}"}}}}"#,
                    self.address
                )
            })
            .collect()
    }

    fn heartbeat(&self) -> Heartbeat {
        Heartbeat::Text(r#"{"method":"ping"}"#.to_string())
    }

    fn parse(&self, text: &str) -> Result<Frame, ParseError> {
        let frame: HyperliquidFrame = serde_json::from_str(text)?;
        let channel = frame.channel.unwrap_or_default();
        match channel.as_str() {
            "subscriptionResponse" => Ok(Frame::Ack),
            "pong" => Ok(Frame::Heartbeat),
            "error" => Ok(Frame::Rejected(
                frame.data.map(|d| d.to_string()).unwrap_or_default(),
            )),
            "user" => self.parse_user_events(frame.data.ok_or(ParseError::MissingField("data"))?),
            "userNonFundingLedgerUpdates" => {
                self.parse_ledger(frame.data.ok_or(ParseError::MissingField("data"))?)
            }
            _ => Ok(Frame::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = "0x1234567890abcdef1234567890abcdef12345678";

    fn adapter() -> HyperliquidAdapter {
        HyperliquidAdapter::new(
            Url::parse(DEFAULT_ENDPOINT).unwrap(),
            Address::from_str(USER).unwrap(),
        )
    }

    fn events(frame: Frame) -> FrameEvents {
        match frame {
            Frame::Events(events) => events,
            other => unreachable!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_handshake_subscribes_user_events_first() {
        let handshake = adapter().handshake();
        assert_eq!(handshake.len(), 2);
        assert_eq!(
            handshake[0],
            format!(r#"{{"method":"subscribe","subscription":{{"type":"userEvents","user":"{USER}"}}}}"#)
        );
        assert!(handshake[1].contains("userNonFundingLedgerUpdates"));
    }

    #[test]
    fn test_control_frames() {
        let a = adapter();
        let ack = r#"{"channel":"subscriptionResponse","data":{"method":"subscribe","subscription":{"type":"userEvents","user":"0x1234567890abcdef1234567890abcdef12345678"}}}"#;
        assert_eq!(a.parse(ack).unwrap(), Frame::Ack);
        assert_eq!(a.parse(r#"{"channel":"pong"}"#).unwrap(), Frame::Heartbeat);
        assert!(matches!(
            a.parse(r#"{"channel":"error","data":"Invalid subscription"}"#).unwrap(),
            Frame::Rejected(msg) if msg.contains("Invalid subscription")
        ));
        assert_eq!(
            a.parse(r#"{"channel":"allMids","data":{}}"#).unwrap(),
            Frame::Ignored
        );
    }

    #[test]
    fn test_fill_batch() {
        let text = r#"{"channel":"user","data":{"fills":[
            {"coin":"BTC","px":"95000.0","sz":"0.5","side":"B","time":1700000000000,"startPosition":"0.0","dir":"Open Long","closedPnl":"0.0","hash":"0xabc","oid":1,"crossed":true,"fee":"10.5","tid":1,"feeToken":"USDC"},
            {"coin":"ETH","px":"3000","sz":"2","side":"A","time":1700000000001,"startPosition":"4.0","dir":"Close Long","closedPnl":"120.5","hash":"0xdef","oid":2,"crossed":true,"fee":"1.2","tid":2,"feeToken":"USDC"},
            {"coin":"@107","px":"20","sz":"10","side":"A","time":1700000000002,"startPosition":"10","dir":"Sell","closedPnl":"5","hash":"0x1","fee":"0","liquidation":null}
        ]}}"#;
        let events = events(adapter().parse(text).unwrap());
        assert_eq!(events.len(), 3);

        let CanonicalEvent::Fill(open) = &events[0] else {
            unreachable!("expected fill");
        };
        assert_eq!(open.address.as_str(), USER);
        assert_eq!(open.direction, Direction::Long);
        assert_eq!(open.kind, NotificationType::Open);
        assert_eq!(open.order_type, OrderType::Perp);
        assert_eq!(open.notional_usd, Decimal::from(47_500));

        let CanonicalEvent::Fill(close) = &events[1] else {
            unreachable!("expected fill");
        };
        assert_eq!(close.direction, Direction::Short);
        assert_eq!(close.kind, NotificationType::Close);
        assert_eq!(close.closed_pnl, Some(Decimal::new(1205, 1)));

        let CanonicalEvent::Fill(spot) = &events[2] else {
            unreachable!("expected fill");
        };
        assert_eq!(spot.order_type, OrderType::Spot);
        // Realized PnL without a "Close" label still counts as a close.
        assert_eq!(spot.kind, NotificationType::Close);
    }

    #[test]
    fn test_liquidation_fill() {
        let text = r#"{"channel":"user","data":{"fills":[
            {"coin":"SOL","px":"150","sz":"100","side":"A","time":1700000000000,"dir":"Close Long","closedPnl":"-900","hash":"0x2","fee":"3","liquidation":{"liquidatedUser":"0x1234567890abcdef1234567890abcdef12345678","markPx":"150","method":"market"}}
        ]}}"#;
        let events = events(adapter().parse(text).unwrap());
        assert_eq!(events[0].notification_type(), Some(NotificationType::Liquidation));
    }

    #[test]
    fn test_funding() {
        let text = r#"{"channel":"user","data":{"funding":{"time":1700000000000,"coin":"ETH","usdc":"-1.25","szi":"-3.0","fundingRate":"0.0000125"}}}"#;
        let events = events(adapter().parse(text).unwrap());
        let CanonicalEvent::Funding(funding) = &events[0] else {
            unreachable!("expected funding");
        };
        assert_eq!(funding.direction, Direction::Short);
        assert_eq!(funding.amount_usd, Decimal::new(-125, 2));
        assert_eq!(funding.notional_usd, Decimal::new(125, 2));
    }

    #[test]
    fn test_account_liquidation_is_venue_liquidation() {
        let text = r#"{"channel":"user","data":{"liquidation":{"lid":1,"liquidator":"0x0000000000000000000000000000000000000001","liquidated_user":"0x1234567890ABCDEF1234567890abcdef12345678","liquidated_ntl_pos":"-50000.0","liquidated_account_value":"1000.0"}}}"#;
        let events = events(adapter().parse(text).unwrap());
        let CanonicalEvent::Liquidation(liq) = &events[0] else {
            unreachable!("expected liquidation");
        };
        assert_eq!(liq.venue, Venue::Hyperliquid);
        assert_eq!(liq.direction, Direction::Short);
        assert_eq!(liq.notional_usd, Decimal::from(50_000));
        assert_eq!(liq.address.as_ref().map(|a| a.as_str()), Some(USER));
    }

    #[test]
    fn test_ledger_updates() {
        let snapshot = r#"{"channel":"userNonFundingLedgerUpdates","data":{"isSnapshot":true,"user":"0x1234567890abcdef1234567890abcdef12345678","nonFundingLedgerUpdates":[{"time":1,"hash":"0x1","delta":{"type":"deposit","usdc":"100"}}]}}"#;
        assert_eq!(adapter().parse(snapshot).unwrap(), Frame::Ignored);

        let live = r#"{"channel":"userNonFundingLedgerUpdates","data":{"user":"0x1234567890abcdef1234567890abcdef12345678","nonFundingLedgerUpdates":[
            {"time":1700000000000,"hash":"0xd","delta":{"type":"deposit","usdc":"2500.5"}},
            {"time":1700000000001,"hash":"0xw","delta":{"type":"withdraw","usdc":"1000","nonce":7,"fee":"1"}},
            {"time":1700000000002,"hash":"0xs","delta":{"type":"spotTransfer","token":"PURR","amount":"1"}}
        ]}}"#;
        let events = events(adapter().parse(live).unwrap());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].notification_type(), Some(NotificationType::Deposit));
        assert_eq!(events[0].notional_usd(), Decimal::new(25005, 1));
        let CanonicalEvent::Withdrawal(w) = &events[1] else {
            unreachable!("expected withdrawal");
        };
        assert_eq!(w.fee, Some(Decimal::ONE));
        assert_eq!(w.amount_usd, Decimal::from(1000));
    }

    #[test]
    fn test_label_names_the_address() {
        assert_eq!(adapter().label(), "hyperliquid:0x1234...5678");
    }

    #[test]
    fn test_bad_funding_does_not_drop_fills() {
        let text = r#"{"channel":"user","data":{
            "fills":[{"coin":"BTC","px":"95000","sz":"1","side":"B","time":1700000000000,"dir":"Open Long","closedPnl":"0","hash":"0xa"}],
            "funding":{"time":1700000000000,"coin":"ETH","usdc":"oops","szi":"-3.0","fundingRate":"0.0001"}
        }}"#;
        let events = events(adapter().parse(text).unwrap());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind_name(), "fill");
    }

    #[test]
    fn test_twap_history_reports_activated_and_terminated() {
        let text = r#"{"channel":"user","data":{"twapHistory":[
            {"time":1700000000,"twapId":42,"state":{"coin":"BTC","user":"0x1234567890abcdef1234567890abcdef12345678","side":"B","sz":"10.0","executedSz":"0.0","executedNtl":"0.0","minutes":30,"reduceOnly":false,"randomize":true,"timestamp":1700000000123},"status":{"status":"activated","description":""}},
            {"time":1700001800,"twapId":41,"state":{"coin":"ETH","side":"A","sz":"50","executedSz":"20","executedNtl":"60000.5","minutes":60,"reduceOnly":true,"randomize":false},"status":{"status":"terminated","description":""}},
            {"time":1700001900,"twapId":40,"state":{"coin":"SOL","side":"A","sz":"5","executedSz":"5","executedNtl":"750","minutes":10,"reduceOnly":false,"randomize":false},"status":{"status":"finished","description":""}}
        ]}}"#;
        let events = events(adapter().parse(text).unwrap());
        assert_eq!(events.len(), 2);

        let CanonicalEvent::Twap(activated) = &events[0] else {
            unreachable!("expected twap");
        };
        assert_eq!(activated.status, TwapStatus::Activated);
        assert_eq!(activated.direction, Direction::Long);
        assert_eq!(activated.size, Decimal::from(10));
        assert_eq!(activated.minutes, 30);
        assert!(activated.randomize);
        assert_eq!(activated.twap_id, Some(42));
        assert_eq!(activated.timestamp.millisecond(), 123);
        assert_eq!(activated.address.as_str(), USER);

        let CanonicalEvent::Twap(terminated) = &events[1] else {
            unreachable!("expected twap");
        };
        assert_eq!(terminated.status, TwapStatus::Terminated);
        assert_eq!(terminated.direction, Direction::Short);
        assert_eq!(terminated.executed_notional_usd, Decimal::new(600005, 1));
        assert_eq!(terminated.timestamp.unix_timestamp(), 1_700_001_800);
        assert_eq!(events[1].notification_type(), Some(NotificationType::Twap));
    }

    #[test]
    fn test_twap_slice_fills_are_ignored() {
        let text = r#"{"channel":"user","data":{"twapSliceFills":[{"fill":{"coin":"BTC","px":"95000","sz":"0.1","side":"B","time":1700000000000},"twapId":42}]}}"#;
        assert_eq!(adapter().parse(text).unwrap(), Frame::Ignored);
    }
}
