//! Configuration module for hypertrack-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{
    BybitSettings, HyperliquidSettings, Settings, TelegramSettings, VenueSettings,
};
use hypertrack_core::adapters::{binance, bybit, gateio, hyperliquid};
use hypertrack_core::processors::{DeliveryConfig, SupervisorConfig};
use hypertrack_core::utils::backoff::{INITIAL_BACKOFF, MAX_BACKOFF};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable that overrides `telegram.bot_token`.
pub const BOT_TOKEN_ENV: &str = "HYPERTRACK_BOT_TOKEN";

const TELEGRAM_API_BASE: &str = "https://api.telegram.org/";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid endpoint: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
    token_override: Option<String>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(
        config_path: impl AsRef<Path>,
        listen_override: Option<SocketAddr>,
        token_override: Option<String>,
    ) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
            token_override: token_override.filter(|t| !t.is_empty()),
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI and environment overrides
    /// 3. Validate the configuration
    /// 4. Resolve defaults into runtime settings
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    pub fn load_str(&self, config_content: &str) -> Result<Settings, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }
        if let Some(token) = &self.token_override {
            file_config.telegram.bot_token = token.clone();
        }

        self.validate(&file_config)?;
        self.build_settings(file_config)
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if config.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "telegram.bot_token is empty and {BOT_TOKEN_ENV} is not set"
            )));
        }
        if config.telegram.min_send_interval_ms == 0 {
            return invalid("telegram.min_send_interval_ms must be greater than zero");
        }
        if config.telegram.max_concurrency == 0 {
            return invalid("telegram.max_concurrency must be greater than zero");
        }
        if config.pipeline.bus_capacity == 0 {
            return invalid("pipeline.bus_capacity must be greater than zero");
        }
        if config.pipeline.delivery_capacity == 0 {
            return invalid("pipeline.delivery_capacity must be greater than zero");
        }
        if config.pipeline.handshake_timeout_secs == 0 {
            return invalid("pipeline.handshake_timeout_secs must be greater than zero");
        }
        if config.pipeline.ping_interval_secs == 0 {
            return invalid("pipeline.ping_interval_secs must be greater than zero");
        }
        if config.venues.bybit.enabled
            && config.venues.bybit.symbols.iter().all(|s| s.trim().is_empty())
        {
            return invalid("venues.bybit is enabled but has no symbols");
        }
        if config.venues.hyperliquid.enabled && config.venues.hyperliquid.max_addresses == 0 {
            return invalid("venues.hyperliquid.max_addresses must be greater than zero");
        }
        Ok(())
    }

    fn build_settings(&self, file_config: FileConfig) -> Result<Settings, ConfigError> {
        let pipeline = &file_config.pipeline;
        let telegram = &file_config.telegram;
        let venues = &file_config.venues;
        let drain_grace = Duration::from_secs(pipeline.drain_grace_secs);

        let endpoint = |configured: &Option<Url>, default: &str| -> Result<Url, ConfigError> {
            match configured {
                Some(url) => Ok(url.clone()),
                None => Ok(Url::parse(default)?),
            }
        };

        let binance = match venues.binance.enabled {
            true => Some(endpoint(&venues.binance.endpoint, binance::DEFAULT_ENDPOINT)?),
            false => None,
        };
        let gateio = match venues.gateio.enabled {
            true => Some(endpoint(&venues.gateio.endpoint, gateio::DEFAULT_ENDPOINT)?),
            false => None,
        };
        let bybit = match venues.bybit.enabled {
            true => Some(BybitSettings {
                endpoint: endpoint(&venues.bybit.endpoint, bybit::DEFAULT_ENDPOINT)?,
                symbols: venues
                    .bybit
                    .symbols
                    .iter()
                    .map(|s| s.trim().to_ascii_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
            }),
            false => None,
        };
        let hyperliquid = match venues.hyperliquid.enabled {
            true => Some(HyperliquidSettings {
                endpoint: endpoint(&venues.hyperliquid.endpoint, hyperliquid::DEFAULT_ENDPOINT)?,
                max_addresses: venues.hyperliquid.max_addresses,
            }),
            false => None,
        };

        Ok(Settings {
            listen: file_config.server.listen,
            telegram: TelegramSettings {
                bot_token: telegram.bot_token.trim().to_string(),
                api_base: endpoint(&telegram.api_base, TELEGRAM_API_BASE)?,
            },
            bus_capacity: pipeline.bus_capacity,
            delivery_capacity: pipeline.delivery_capacity,
            drain_grace,
            delivery: DeliveryConfig {
                min_send_interval: Duration::from_millis(telegram.min_send_interval_ms),
                max_concurrency: telegram.max_concurrency,
                max_rate_limit_retries: telegram.max_rate_limit_retries,
                drain_grace,
            },
            supervisor: SupervisorConfig {
                handshake_timeout: Duration::from_secs(pipeline.handshake_timeout_secs),
                stable_after: Duration::from_secs(pipeline.stable_after_secs),
                idle_timeout: Duration::from_secs(pipeline.idle_timeout_secs),
                ping_interval: Duration::from_secs(pipeline.ping_interval_secs),
                initial_backoff: INITIAL_BACKOFF,
                max_backoff: MAX_BACKOFF,
            },
            venues: VenueSettings {
                binance,
                bybit,
                gateio,
                hyperliquid,
            },
            subscribers_path: file_config.storage.subscribers_path,
        })
    }
}
