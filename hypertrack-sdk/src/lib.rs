//! Shared types for HyperTrack.
//!
//! Everything in this crate is plain data with serde support: the venue and
//! direction vocabulary, subscriber identities, the versioned [`FilterSpec`]
//! document and the bodies exchanged with the control API. The pipeline
//! itself lives in `hypertrack-core`.

#![forbid(unsafe_code)]

pub mod objects;

pub use objects::{
    Address, AddressParseError, AffectedRegistrations, ConnectionHealth, ConnectionState,
    Direction, DirectionFilter, FilterSpec, FilterSpecError, HealthResponse, NotificationType,
    OrderType, Scope, StatsSnapshot, SubscriberId, SubscriptionChange, UpdateFilterRequest, Venue,
};
