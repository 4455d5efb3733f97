#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod adapters;
pub mod events;
pub mod health;
pub mod processors;
pub mod stats;
pub mod subscriptions;
pub mod utils;
