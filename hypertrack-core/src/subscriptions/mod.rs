//! Subscriber registrations and the filters applied to them.

pub mod filter;
pub mod registry;

pub use filter::{Rejection, asset_matches, base_asset, check, evaluate};
pub use registry::{
    DisableLiquidationMonitoring, EnableLiquidationMonitoring, Reactivate, RegistryError,
    RegistrySnapshot, SubscribeAddress, Subscriber, SubscriptionRecord, SubscriptionRegistry,
    UnsubscribeAddress, UpdateFilter,
};
