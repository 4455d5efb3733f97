//! Bybit V5 public linear `allLiquidation` stream.

use super::{
    Frame, FrameEvents, Heartbeat, ParseError, VenueAdapter, WireNumber, timestamp_ms,
};
use crate::events::{CanonicalEvent, LiquidationEvent, notional};
use compact_str::CompactString;
use hypertrack_sdk::{Direction, Venue};
use serde::Deserialize;
use tracing::warn;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "wss://stream.bybit.com/v5/public/linear";

const TOPIC_PREFIX: &str = "allLiquidation.";

pub struct BybitAdapter {
    endpoint: Url,
    symbols: Vec<CompactString>,
}

impl BybitAdapter {
    pub fn new(endpoint: Url, symbols: impl IntoIterator<Item = impl Into<CompactString>>) -> Self {
        Self {
            endpoint,
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BybitFrame {
    op: Option<CompactString>,
    success: Option<bool>,
    ret_msg: Option<String>,
    topic: Option<CompactString>,
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct LiquidationRecord {
    #[serde(rename = "T")]
    time: i64,
    #[serde(rename = "s")]
    symbol: CompactString,
    #[serde(rename = "S")]
    side: CompactString,
    #[serde(rename = "v")]
    size: WireNumber,
    #[serde(rename = "p")]
    price: WireNumber,
}

fn parse_record(value: serde_json::Value) -> Result<CanonicalEvent, ParseError> {
    let record: LiquidationRecord = serde_json::from_value(value)?;
    // The side is the side of the liquidated position.
    let direction = match record.side.as_str() {
        "Buy" => Direction::Long,
        "Sell" => Direction::Short,
        other => return Err(ParseError::UnknownSide(other.to_string())),
    };
    let size = record.size.to_decimal("v")?;
    let price = record.price.to_decimal("p")?;
    Ok(CanonicalEvent::Liquidation(LiquidationEvent {
        venue: Venue::Bybit,
        pair: record.symbol,
        direction,
        size,
        notional_usd: notional(size, price),
        price,
        address: None,
        tx_hash: None,
        timestamp: timestamp_ms(record.time)?,
    }))
}

impl VenueAdapter for BybitAdapter {
    fn venue(&self) -> Venue {
        Venue::Bybit
    }

    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn handshake(&self) -> Vec<String> {
        self.symbols
            .iter()
            .map(|symbol| format!(r#"{{"op":"subscribe","args":["{TOPIC_PREFIX}{symbol}"]}}"#))
            .collect()
    }

    fn heartbeat(&self) -> Heartbeat {
        Heartbeat::Text(r#"{"op":"ping"}"#.to_string())
    }

    fn parse(&self, text: &str) -> Result<Frame, ParseError> {
        let frame: BybitFrame = serde_json::from_str(text)?;

        match frame.op.as_deref() {
            Some("subscribe") => {
                return Ok(if frame.success.unwrap_or(false) {
                    Frame::Ack
                } else {
                    Frame::Rejected(frame.ret_msg.unwrap_or_default())
                });
            }
            Some("ping") | Some("pong") => return Ok(Frame::Heartbeat),
            Some(_) => return Ok(Frame::Ignored),
            None => {}
        }

        let is_liquidation = frame
            .topic
            .as_deref()
            .is_some_and(|t| t.starts_with(TOPIC_PREFIX));
        if !is_liquidation {
            return Ok(Frame::Ignored);
        }

        let Some(serde_json::Value::Array(records)) = frame.data else {
            return Err(ParseError::MissingField("data"));
        };
        let mut events = FrameEvents::new();
        for record in records {
            match parse_record(record) {
                Ok(event) => events.push(event),
                Err(e) => warn!(venue = %Venue::Bybit, error = %e, "Skipping malformed liquidation record"),
            }
        }
        Ok(Frame::from_events(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn adapter() -> BybitAdapter {
        BybitAdapter::new(Url::parse(DEFAULT_ENDPOINT).unwrap(), ["BTCUSDT", "ETHUSDT"])
    }

    #[test]
    fn test_handshake_is_one_subscribe_per_symbol() {
        assert_eq!(
            adapter().handshake(),
            vec![
                r#"{"op":"subscribe","args":["allLiquidation.BTCUSDT"]}"#.to_string(),
                r#"{"op":"subscribe","args":["allLiquidation.ETHUSDT"]}"#.to_string(),
            ]
        );
    }

    #[test]
    fn test_subscribe_responses() {
        let ok = r#"{"success":true,"ret_msg":"","conn_id":"abc","req_id":"","op":"subscribe"}"#;
        assert_eq!(adapter().parse(ok).unwrap(), Frame::Ack);

        let refused = r#"{"success":false,"ret_msg":"error:handler not found,topic:allLiquidation.FOO","conn_id":"abc","op":"subscribe"}"#;
        assert!(matches!(adapter().parse(refused).unwrap(), Frame::Rejected(msg) if msg.contains("handler not found")));

        let pong = r#"{"success":true,"ret_msg":"pong","conn_id":"abc","op":"ping"}"#;
        assert_eq!(adapter().parse(pong).unwrap(), Frame::Heartbeat);
    }

    #[test]
    fn test_batch_yields_one_event_per_record() {
        let text = r#"{"topic":"allLiquidation.BTCUSDT","type":"snapshot","ts":1739502303204,"data":[
            {"T":1739502302929,"s":"BTCUSDT","S":"Buy","v":"0.5","p":"96000"},
            {"T":1739502302930,"s":"BTCUSDT","S":"Sell","v":"0.1","p":"96100.5"}
        ]}"#;
        let Frame::Events(events) = adapter().parse(text).unwrap() else {
            unreachable!("expected events");
        };
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].direction(), Some(Direction::Long));
        assert_eq!(events[0].notional_usd(), Decimal::from(48_000));
        assert_eq!(events[1].direction(), Some(Direction::Short));
        assert_eq!(events[1].notional_usd(), Decimal::from_str("9610.05").unwrap());
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let text = r#"{"topic":"allLiquidation.BTCUSDT","data":[
            {"T":1,"s":"BTCUSDT","S":"Sideways","v":"1","p":"1"},
            {"T":2,"s":"BTCUSDT","S":"Buy","v":"1","p":"2"}
        ]}"#;
        let Frame::Events(events) = adapter().parse(text).unwrap() else {
            unreachable!("expected events");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].notional_usd(), Decimal::from(2));

        let all_bad = r#"{"topic":"allLiquidation.BTCUSDT","data":[{"T":1}]}"#;
        assert_eq!(adapter().parse(all_bad).unwrap(), Frame::Ignored);
    }

    #[test]
    fn test_other_topics_are_ignored() {
        let text = r#"{"topic":"tickers.BTCUSDT","data":[]}"#;
        assert_eq!(adapter().parse(text).unwrap(), Frame::Ignored);
    }
}
