pub mod control;
pub mod filter;
pub mod health;
pub mod identity;
pub mod stats;
pub mod venues;

pub use control::{AffectedRegistrations, HealthResponse, SubscriptionChange, UpdateFilterRequest};
pub use filter::{DirectionFilter, FilterSpec, FilterSpecError, NotificationType};
pub use health::{ConnectionHealth, ConnectionState};
pub use identity::{Address, AddressParseError, Scope, SubscriberId};
pub use stats::StatsSnapshot;
pub use venues::{Direction, OrderType, Venue};
