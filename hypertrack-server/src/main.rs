//! HyperTrack Server
//!
//! Streams liquidations from Binance, Bybit, Gate.io and Hyperliquid plus
//! per-account Hyperliquid activity, filters them per subscriber and
//! delivers chat notifications.

mod api;
mod config;
mod notifier;
mod server;
mod shutdown;
mod state;
mod store;

use clap::Parser;
use config::ConfigLoader;
use config::runtime::Settings;
use hypertrack_core::adapters::VenueAdapter;
use hypertrack_core::adapters::binance::BinanceAdapter;
use hypertrack_core::adapters::bybit::BybitAdapter;
use hypertrack_core::adapters::gateio::GateIoAdapter;
use hypertrack_core::events::{BusSenders, EventBus, delivery_job_channel};
use hypertrack_core::health::HealthBoard;
use hypertrack_core::processors::{
    ConnectionSupervisor, DeliveryWorker, Dispatcher, HyperliquidFeedManager,
};
use hypertrack_core::stats::StatsAggregator;
use hypertrack_core::subscriptions::SubscriptionRegistry;
use hypertrack_sdk::Venue;
use notifier::TelegramNotifier;
use server::{build_router, run_server};
use shutdown::spawn_signal_handler;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use store::JsonFileStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// HyperTrack - cross-venue liquidation and wallet activity notifier
#[derive(Parser, Debug)]
#[command(name = "hypertrack-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./hypertrack.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long, default_value = "false")]
    log_json: bool,

    /// Chat bot token, overrides the config file
    #[arg(long, env = "HYPERTRACK_BOT_TOKEN", hide_env_values = true)]
    bot_token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.log_json);

    tracing::info!("Starting hypertrack-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(&args.config, args.listen, args.bot_token.clone());
    let settings = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let signal_handle = spawn_signal_handler(shutdown_tx.clone());

    // Restore subscriptions
    let max_addresses = settings
        .venues
        .hyperliquid
        .as_ref()
        .map_or(0, |h| h.max_addresses);
    let registry = SubscriptionRegistry::new(max_addresses);
    let store = JsonFileStore::new(&settings.subscribers_path);
    if let Some(snapshot) = store.load().await.map_err(|e| {
        tracing::error!("Failed to load subscriptions: {}", e);
        e
    })? {
        let total = snapshot.subscriptions.len();
        let skipped = registry.restore(snapshot).await;
        for (record, error) in &skipped {
            tracing::warn!(
                subscriber = %record.subscriber,
                scope = %record.scope,
                error = %error,
                "Skipped stored subscription"
            );
        }
        tracing::info!(
            restored = total - skipped.len(),
            skipped = skipped.len(),
            "Subscriptions restored"
        );
    }

    let stats = StatsAggregator::new();
    let health = HealthBoard::new();

    // Event pipeline
    let venues = enabled_venues(&settings);
    let (bus_senders, bus) = EventBus::new(settings.bus_capacity, venues);
    let mut ingest_tasks =
        spawn_venue_supervisors(&settings, &bus_senders, &health, &shutdown_rx).await;

    if let (Some(hyperliquid), Some(events_tx)) = (
        settings.venues.hyperliquid.as_ref(),
        bus_senders.sender(Venue::Hyperliquid),
    ) {
        let feed_manager = HyperliquidFeedManager::new(
            hyperliquid.endpoint.clone(),
            events_tx,
            settings.supervisor.clone(),
            health.clone(),
            hyperliquid.max_addresses,
        );
        ingest_tasks.push(tokio::spawn(
            feed_manager.run(registry.tracked_addresses(), shutdown_rx.clone()),
        ));
    }
    // Supervisors own their senders; the bus closes once they all stop.
    drop(bus_senders);

    let notifier = TelegramNotifier::new(
        &settings.telegram.api_base,
        &settings.telegram.bot_token,
    )?;
    let (delivery_tx, delivery_rx) = delivery_job_channel(settings.delivery_capacity);
    let delivery_worker = DeliveryWorker::new(
        Arc::new(notifier),
        registry.clone(),
        stats.clone(),
        settings.delivery.clone(),
        delivery_tx.downgrade(),
    );
    let dispatcher = Dispatcher::new(
        registry.clone(),
        stats.clone(),
        delivery_tx,
        settings.drain_grace,
    );
    let delivery_handle = tokio::spawn(delivery_worker.run(delivery_rx, shutdown_rx.clone()));
    let dispatcher_handle = tokio::spawn(dispatcher.run(bus, shutdown_rx.clone()));

    // Control API
    let state = AppState::new(registry, stats, health, store);
    let router = build_router(state.clone());

    tracing::info!("Starting HTTP server on {}", settings.listen);
    let result = run_server(router, settings.listen, shutdown_rx.clone()).await;
    if let Err(e) = &result {
        tracing::error!("HTTP server failed: {}", e);
    }

    // A failed server must still take the pipeline down.
    let _ = shutdown_tx.send(true);
    signal_handle.abort();

    for task in ingest_tasks {
        let _ = task.await;
    }
    let _ = dispatcher_handle.await;
    let _ = delivery_handle.await;

    // Inactive flags set by the delivery worker are persisted here.
    state.persist().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hypertrack_core=info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn enabled_venues(settings: &Settings) -> Vec<Venue> {
    let venues = &settings.venues;
    [
        (Venue::Binance, venues.binance.is_some()),
        (Venue::Bybit, venues.bybit.is_some()),
        (Venue::GateIo, venues.gateio.is_some()),
        (Venue::Hyperliquid, venues.hyperliquid.is_some()),
    ]
    .into_iter()
    .filter_map(|(venue, enabled)| enabled.then_some(venue))
    .collect()
}

/// One supervisor per enabled liquidation-stream venue.
async fn spawn_venue_supervisors(
    settings: &Settings,
    bus_senders: &BusSenders,
    health: &HealthBoard,
    shutdown_rx: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut adapters: Vec<Arc<dyn VenueAdapter>> = Vec::new();
    if let Some(endpoint) = &settings.venues.binance {
        adapters.push(Arc::new(BinanceAdapter::new(endpoint.clone())));
    }
    if let Some(bybit) = &settings.venues.bybit {
        adapters.push(Arc::new(BybitAdapter::new(
            bybit.endpoint.clone(),
            bybit.symbols.clone(),
        )));
    }
    if let Some(endpoint) = &settings.venues.gateio {
        adapters.push(Arc::new(GateIoAdapter::new(endpoint.clone())));
    }

    let mut handles = Vec::new();
    for adapter in adapters {
        let Some(events_tx) = bus_senders.sender(adapter.venue()) else {
            continue;
        };
        let label = adapter.label();
        let (supervisor, health_rx) =
            ConnectionSupervisor::new(adapter, events_tx, settings.supervisor.clone());
        health.register(label, health_rx).await;
        handles.push(tokio::spawn(supervisor.run(shutdown_rx.clone())));
    }
    handles
}
