//! Resolved runtime settings.
//!
//! Built from the file configuration once overrides and defaults are
//! applied; the rest of the server only sees these types.

use hypertrack_core::processors::{DeliveryConfig, SupervisorConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub telegram: TelegramSettings,
    pub bus_capacity: usize,
    pub delivery_capacity: usize,
    pub drain_grace: Duration,
    pub delivery: DeliveryConfig,
    pub supervisor: SupervisorConfig,
    pub venues: VenueSettings,
    pub subscribers_path: PathBuf,
}

#[derive(Clone)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub api_base: Url,
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &"<redacted>")
            .field("api_base", &self.api_base.as_str())
            .finish()
    }
}

/// Endpoints of the enabled venues; `None` means disabled.
#[derive(Debug, Clone)]
pub struct VenueSettings {
    pub binance: Option<Url>,
    pub bybit: Option<BybitSettings>,
    pub gateio: Option<Url>,
    pub hyperliquid: Option<HyperliquidSettings>,
}

#[derive(Debug, Clone)]
pub struct BybitSettings {
    pub endpoint: Url,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HyperliquidSettings {
    pub endpoint: Url,
    pub max_addresses: usize,
}
