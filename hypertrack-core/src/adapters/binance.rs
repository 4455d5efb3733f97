//! Binance USDⓈ-M futures force-order stream.
//!
//! The stream is selected by the URL path, so there is no subscribe
//! handshake. Binance answers protocol pings, which is all the keep-alive
//! it needs.

use super::{Frame, Heartbeat, ParseError, VenueAdapter, WireNumber, parse_decimal, timestamp_ms};
use crate::events::{CanonicalEvent, LiquidationEvent, notional};
use compact_str::CompactString;
use hypertrack_sdk::{Direction, Venue};
use rust_decimal::Decimal;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "wss://fstream.binance.com/ws/!forceOrder@arr";

pub struct BinanceAdapter {
    endpoint: Url,
}

impl BinanceAdapter {
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }
}

#[derive(Debug, Deserialize)]
struct ForceOrderFrame {
    #[serde(rename = "e")]
    event_type: Option<CompactString>,
    #[serde(rename = "E")]
    event_time: Option<i64>,
    #[serde(rename = "o")]
    order: Option<ForceOrder>,
}

#[derive(Debug, Deserialize)]
struct ForceOrder {
    #[serde(rename = "s")]
    symbol: CompactString,
    #[serde(rename = "S")]
    side: CompactString,
    #[serde(rename = "q")]
    quantity: WireNumber,
    #[serde(rename = "p")]
    price: WireNumber,
    #[serde(rename = "ap")]
    average_price: Option<CompactString>,
    #[serde(rename = "T")]
    trade_time: Option<i64>,
}

impl VenueAdapter for BinanceAdapter {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn handshake(&self) -> Vec<String> {
        Vec::new()
    }

    fn heartbeat(&self) -> Heartbeat {
        Heartbeat::Ping
    }

    fn parse(&self, text: &str) -> Result<Frame, ParseError> {
        let frame: ForceOrderFrame = serde_json::from_str(text)?;
        if frame.event_type.as_deref() != Some("forceOrder") {
            return Ok(Frame::Ignored);
        }
        let order = frame.order.ok_or(ParseError::MissingField("o"))?;

        // SELL closes a long position, BUY closes a short one.
        let direction = match order.side.as_str() {
            "SELL" => Direction::Long,
            "BUY" => Direction::Short,
            other => return Err(ParseError::UnknownSide(other.to_string())),
        };
        let size = order.quantity.to_decimal("q")?;
        let average_price = match &order.average_price {
            Some(ap) => parse_decimal("ap", ap)?,
            None => Decimal::ZERO,
        };
        let price = if average_price > Decimal::ZERO {
            average_price
        } else {
            order.price.to_decimal("p")?
        };
        let ms = order
            .trade_time
            .or(frame.event_time)
            .ok_or(ParseError::MissingField("T"))?;

        Ok(Frame::single(CanonicalEvent::Liquidation(LiquidationEvent {
            venue: Venue::Binance,
            pair: order.symbol,
            direction,
            size,
            notional_usd: notional(size, price),
            price,
            address: None,
            tx_hash: None,
            timestamp: timestamp_ms(ms)?,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> BinanceAdapter {
        BinanceAdapter::new(Url::parse(DEFAULT_ENDPOINT).unwrap())
    }

    fn only_liquidation(frame: Frame) -> LiquidationEvent {
        match frame {
            Frame::Events(mut events) if events.len() == 1 => match events.remove(0) {
                CanonicalEvent::Liquidation(e) => e,
                other => unreachable!("unexpected event {other:?}"),
            },
            other => unreachable!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_sell_force_order_is_long_liquidation() {
        let text = r#"{"e":"forceOrder","E":1568014460893,"o":{"s":"BTCUSDT","S":"SELL","o":"LIMIT","f":"IOC","q":"0.250","p":"84000.00","ap":"85000.00","X":"FILLED","l":"0.250","z":"0.250","T":1568014460890}}"#;
        let e = only_liquidation(adapter().parse(text).unwrap());
        assert_eq!(e.venue, Venue::Binance);
        assert_eq!(e.pair, "BTCUSDT");
        assert_eq!(e.direction, Direction::Long);
        assert_eq!(e.price, Decimal::from(85_000));
        assert_eq!(e.notional_usd, Decimal::from(21_250));
        assert_eq!(e.timestamp, timestamp_ms(1568014460890).unwrap());
    }

    #[test]
    fn test_zero_average_price_falls_back_to_price() {
        let text = r#"{"e":"forceOrder","E":1568014460893,"o":{"s":"ETHUSDT","S":"BUY","q":"2","p":"3000","ap":"0"}}"#;
        let e = only_liquidation(adapter().parse(text).unwrap());
        assert_eq!(e.direction, Direction::Short);
        assert_eq!(e.price, Decimal::from(3_000));
        assert_eq!(e.notional_usd, Decimal::from(6_000));
        // No trade time, event time is used.
        assert_eq!(e.timestamp, timestamp_ms(1568014460893).unwrap());
    }

    #[test]
    fn test_other_event_types_are_ignored() {
        assert_eq!(
            adapter().parse(r#"{"e":"aggTrade","E":1}"#).unwrap(),
            Frame::Ignored
        );
        assert_eq!(adapter().parse(r#"{"result":null,"id":1}"#).unwrap(), Frame::Ignored);
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(matches!(adapter().parse("not json"), Err(ParseError::Json(_))));
        let bad_side = r#"{"e":"forceOrder","E":1,"o":{"s":"BTCUSDT","S":"HOLD","q":"1","p":"1"}}"#;
        assert!(matches!(
            adapter().parse(bad_side),
            Err(ParseError::UnknownSide(_))
        ));
    }

    #[test]
    fn test_no_handshake() {
        assert!(adapter().handshake().is_empty());
        assert_eq!(adapter().heartbeat(), Heartbeat::Ping);
    }
}
