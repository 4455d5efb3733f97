//! Event model and channel plumbing for the ingestion pipeline.
//!
//! # Event Flow
//!
//! 1. Venue supervisors parse frames into `CanonicalEvent`s and push them
//!    onto their venue's bus channel.
//! 2. The `Dispatcher` drains the merged bus, filters per subscriber and
//!    emits `DeliveryJob`s.
//! 3. The `DeliveryWorker` sends each job through a `Notifier`.

pub mod channels;
pub mod types;

pub use channels::{
    BusSenders, DEFAULT_BUS_CAPACITY, DEFAULT_CHANNEL_BUFFER, DeliveryJobReceiver,
    DeliveryJobSender, EventBus, VenueEventReceiver, VenueEventSender, delivery_job_channel,
};

pub use types::{
    CanonicalEvent, DeliveryJob, DepositEvent, FillEvent, FundingEvent, LiquidationEvent,
    SendReceipt, TwapEvent, TwapStatus, WithdrawalEvent, notional,
};
