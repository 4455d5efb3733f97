use serde::{Deserialize, Serialize};

/// All venues HyperTrack ingests events from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Venue {
    #[serde(rename = "binance")]
    Binance,
    #[serde(rename = "bybit")]
    Bybit,
    #[serde(rename = "gateio", alias = "gate.io")]
    GateIo,
    #[serde(rename = "hyperliquid")]
    Hyperliquid,
}

impl Venue {
    pub const ALL: [Venue; 4] = [Venue::Binance, Venue::Bybit, Venue::GateIo, Venue::Hyperliquid];

    /// Lowercase identifier, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Bybit => "bybit",
            Venue::GateIo => "gateio",
            Venue::Hyperliquid => "hyperliquid",
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Venue::Binance => write!(f, "Binance"),
            Venue::Bybit => write!(f, "Bybit"),
            Venue::GateIo => write!(f, "Gate.io"),
            Venue::Hyperliquid => write!(f, "Hyperliquid"),
        }
    }
}

/// Side of the position an event refers to.
///
/// For liquidations this is the side of the position that was closed out,
/// not the side of the liquidation order itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Spot,
    Perp,
}
