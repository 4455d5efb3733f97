//! TOML file configuration structures.
//!
//! These structs directly map to the `hypertrack.toml` file format. Every
//! field has a default, so an empty file is a valid configuration apart
//! from the bot token.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub pipeline: PipelineConfig,
    pub venues: VenuesConfig,
    pub storage: StorageConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080)
}

/// Chat delivery section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Overridden by `HYPERTRACK_BOT_TOKEN` when set.
    #[serde(default)]
    pub bot_token: String,
    /// Defaults to the public Bot API.
    #[serde(default)]
    pub api_base: Option<Url>,
    #[serde(default = "default_min_send_interval_ms")]
    pub min_send_interval_ms: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: None,
            min_send_interval_ms: default_min_send_interval_ms(),
            max_concurrency: default_max_concurrency(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
        }
    }
}

fn default_min_send_interval_ms() -> u64 {
    50
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_rate_limit_retries() -> u32 {
    3
}

/// Queue sizes and connection timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
    #[serde(default = "default_delivery_capacity")]
    pub delivery_capacity: usize,
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_drain_grace_secs")]
    pub drain_grace_secs: u64,
    #[serde(default = "default_stable_after_secs")]
    pub stable_after_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bus_capacity: default_bus_capacity(),
            delivery_capacity: default_delivery_capacity(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            drain_grace_secs: default_drain_grace_secs(),
            stable_after_secs: default_stable_after_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

fn default_bus_capacity() -> usize {
    hypertrack_core::events::DEFAULT_BUS_CAPACITY
}

fn default_delivery_capacity() -> usize {
    hypertrack_core::events::DEFAULT_CHANNEL_BUFFER
}

fn default_handshake_timeout_secs() -> u64 {
    10
}

fn default_drain_grace_secs() -> u64 {
    5
}

fn default_stable_after_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    90
}

fn default_ping_interval_secs() -> u64 {
    20
}

/// Per-venue sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenuesConfig {
    #[serde(default)]
    pub binance: VenueConfig,
    #[serde(default)]
    pub bybit: BybitConfig,
    #[serde(default)]
    pub gateio: VenueConfig,
    #[serde(default)]
    pub hyperliquid: HyperliquidConfig,
}

impl Default for VenuesConfig {
    fn default() -> Self {
        Self {
            binance: VenueConfig::default(),
            bybit: BybitConfig::default(),
            gateio: VenueConfig::default(),
            hyperliquid: HyperliquidConfig::default(),
        }
    }
}

/// A venue without extra settings. A missing endpoint means the venue's
/// public default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: Option<Url>,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BybitConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: Option<Url>,
    /// One `allLiquidation.<SYMBOL>` topic is subscribed per entry.
    #[serde(default = "default_bybit_symbols")]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperliquidConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: Option<Url>,
    #[serde(default = "default_max_addresses")]
    pub max_addresses: usize,
}

fn default_enabled() -> bool {
    true
}

impl Default for BybitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            symbols: default_bybit_symbols(),
        }
    }
}

fn default_bybit_symbols() -> Vec<String> {
    ["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT", "DOGEUSDT"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for HyperliquidConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            max_addresses: default_max_addresses(),
        }
    }
}

fn default_max_addresses() -> usize {
    hypertrack_core::adapters::hyperliquid::DEFAULT_MAX_ADDRESSES
}

/// Subscriber persistence section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_subscribers_path")]
    pub subscribers_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            subscribers_path: default_subscribers_path(),
        }
    }
}

fn default_subscribers_path() -> PathBuf {
    PathBuf::from("./subscribers.json")
}
