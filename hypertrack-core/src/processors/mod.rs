//! Event processors for the event-driven pipeline.
//!
//! This module contains all the processors that move events through the
//! system:
//!
//! - `ConnectionSupervisor`: Owns one venue socket, emits `CanonicalEvent`
//! - `HyperliquidFeedManager`: Keeps one supervisor per tracked address
//! - `Dispatcher`: Receives `CanonicalEvent`, emits `DeliveryJob`
//! - `DeliveryWorker`: Receives `DeliveryJob`, delivers through a `Notifier`

pub mod delivery;
pub mod dispatcher;
pub mod feed_manager;
pub mod supervisor;

pub use delivery::{DeliveryConfig, DeliveryResult, DeliveryWorker, Notifier};
pub use dispatcher::{DispatchError, Dispatcher};
pub use feed_manager::HyperliquidFeedManager;
pub use supervisor::{AdapterError, ConnectionSupervisor, SupervisorConfig};
