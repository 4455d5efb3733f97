//! Gate.io USDT futures `futures.public_liquidates` stream.

use super::{
    Frame, FrameEvents, Heartbeat, ParseError, VenueAdapter, WireNumber, timestamp_ms,
};
use crate::events::{CanonicalEvent, LiquidationEvent, notional};
use compact_str::CompactString;
use hypertrack_sdk::{Direction, Venue};
use rust_decimal::Decimal;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::warn;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "wss://fx-ws.gateio.ws/v4/ws/usdt";

const CHANNEL: &str = "futures.public_liquidates";

pub struct GateIoAdapter {
    endpoint: Url,
}

impl GateIoAdapter {
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }
}

#[derive(Debug, Deserialize)]
struct GateFrame {
    channel: Option<CompactString>,
    event: Option<CompactString>,
    error: Option<serde_json::Value>,
    result: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct LiquidationRecord {
    contract: CompactString,
    size: WireNumber,
    price: WireNumber,
    time_ms: i64,
}

fn parse_record(value: serde_json::Value) -> Result<CanonicalEvent, ParseError> {
    let record: LiquidationRecord = serde_json::from_value(value)?;
    let size = record.size.to_decimal("size")?;
    let price = record.price.to_decimal("price")?;
    // Positive size closed a long position.
    let direction = if size > Decimal::ZERO {
        Direction::Long
    } else if size < Decimal::ZERO {
        Direction::Short
    } else {
        return Err(ParseError::UnknownSide("0".to_string()));
    };
    Ok(CanonicalEvent::Liquidation(LiquidationEvent {
        venue: Venue::GateIo,
        pair: record.contract,
        direction,
        size: size.abs(),
        notional_usd: notional(size, price),
        price,
        address: None,
        tx_hash: None,
        timestamp: timestamp_ms(record.time_ms)?,
    }))
}

impl VenueAdapter for GateIoAdapter {
    fn venue(&self) -> Venue {
        Venue::GateIo
    }

    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn handshake(&self) -> Vec<String> {
        vec![format!(
            r#"{{"channel":"{CHANNEL}","event":"subscribe","payload":["!all"]}}"#
        )]
    }

    fn heartbeat(&self) -> Heartbeat {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Heartbeat::Text(format!(r#"{{"time":{now},"channel":"futures.ping"}}"#))
    }

    fn parse(&self, text: &str) -> Result<Frame, ParseError> {
        let frame: GateFrame = serde_json::from_str(text)?;

        match frame.channel.as_deref() {
            Some("futures.pong") | Some("futures.ping") => return Ok(Frame::Heartbeat),
            Some(CHANNEL) => {}
            _ => return Ok(Frame::Ignored),
        }

        match frame.event.as_deref() {
            Some("subscribe") => {
                if let Some(error) = frame.error.filter(|e| !e.is_null()) {
                    return Ok(Frame::Rejected(error.to_string()));
                }
                let status = frame
                    .result
                    .as_ref()
                    .and_then(|r| r.get("status"))
                    .and_then(|s| s.as_str());
                Ok(match status {
                    Some("success") => Frame::Ack,
                    other => Frame::Rejected(format!("subscribe status {other:?}")),
                })
            }
            Some("update") => {
                let Some(serde_json::Value::Array(records)) = frame.result else {
                    return Err(ParseError::MissingField("result"));
                };
                let mut events = FrameEvents::new();
                for record in records {
                    match parse_record(record) {
                        Ok(event) => events.push(event),
                        Err(e) => warn!(venue = %Venue::GateIo, error = %e, "Skipping malformed liquidation record"),
                    }
                }
                Ok(Frame::from_events(events))
            }
            _ => Ok(Frame::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> GateIoAdapter {
        GateIoAdapter::new(Url::parse(DEFAULT_ENDPOINT).unwrap())
    }

    #[test]
    fn test_handshake_payload() {
        assert_eq!(
            adapter().handshake(),
            vec![
                r#"{"channel":"futures.public_liquidates","event":"subscribe","payload":["!all"]}"#
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_heartbeat_is_futures_ping() {
        let Heartbeat::Text(text) = adapter().heartbeat() else {
            unreachable!("expected text heartbeat");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["channel"], "futures.ping");
        assert!(value["time"].is_i64());
    }

    #[test]
    fn test_subscribe_ack_and_error() {
        let ok = r#"{"time":1545404023,"time_ms":1545404023123,"channel":"futures.public_liquidates","event":"subscribe","error":null,"result":{"status":"success"}}"#;
        assert_eq!(adapter().parse(ok).unwrap(), Frame::Ack);

        let err = r#"{"time":1545404023,"channel":"futures.public_liquidates","event":"subscribe","error":{"code":2,"message":"unknown contract"},"result":null}"#;
        assert!(matches!(adapter().parse(err).unwrap(), Frame::Rejected(msg) if msg.contains("unknown contract")));
    }

    #[test]
    fn test_update_sign_of_size_gives_direction() {
        let text = r#"{"channel":"futures.public_liquidates","event":"update","time":1541505434,"result":[
            {"price":"215.1","size":124,"time_ms":1541505434123,"contract":"ETH_USDT"},
            {"price":64000,"size":-2,"time_ms":1541505434124,"contract":"BTC_USDT"}
        ]}"#;
        let Frame::Events(events) = adapter().parse(text).unwrap() else {
            unreachable!("expected events");
        };
        assert_eq!(events.len(), 2);
        let CanonicalEvent::Liquidation(eth) = &events[0] else {
            unreachable!("expected liquidation");
        };
        assert_eq!(eth.direction, Direction::Long);
        assert_eq!(eth.size, Decimal::from(124));
        assert_eq!(eth.notional_usd, Decimal::new(266724, 1));
        let CanonicalEvent::Liquidation(btc) = &events[1] else {
            unreachable!("expected liquidation");
        };
        assert_eq!(btc.direction, Direction::Short);
        assert_eq!(btc.size, Decimal::from(2));
        assert_eq!(btc.notional_usd, Decimal::from(128_000));
    }

    #[test]
    fn test_pong_is_heartbeat() {
        let text = r#"{"time":1545404023,"channel":"futures.pong","event":"","error":null,"result":null}"#;
        assert_eq!(adapter().parse(text).unwrap(), Frame::Heartbeat);
    }
}
