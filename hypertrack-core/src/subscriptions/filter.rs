//! Filter evaluation.
//!
//! Predicates run in a fixed order (scope/venue, asset, direction,
//! notional, notification type) and the first failure short-circuits.
//! [`check`] reports which predicate failed, which the dispatcher logs.

use crate::events::CanonicalEvent;
use hypertrack_sdk::{FilterSpec, NotificationType, Scope};

/// The predicate an event failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Account event for a different address, or event kind not routable
    /// to this registration's scope.
    Scope,
    Venue,
    Asset,
    Direction,
    Notional,
    NotificationType,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Rejection::Scope => "scope",
            Rejection::Venue => "venue",
            Rejection::Asset => "asset",
            Rejection::Direction => "direction",
            Rejection::Notional => "notional",
            Rejection::NotificationType => "notification_type",
        };
        f.write_str(s)
    }
}

/// Whether `event` should be delivered to a registration with this scope
/// and filter.
pub fn evaluate(event: &CanonicalEvent, scope: &Scope, spec: &FilterSpec) -> bool {
    check(event, scope, spec).is_ok()
}

pub fn check(event: &CanonicalEvent, scope: &Scope, spec: &FilterSpec) -> Result<(), Rejection> {
    match (event, scope) {
        (CanonicalEvent::Liquidation(liquidation), Scope::Global) => {
            if !spec.venues.contains(&liquidation.venue) {
                return Err(Rejection::Venue);
            }
        }
        (CanonicalEvent::Liquidation(_), Scope::Address(_)) => return Err(Rejection::Scope),
        (_, Scope::Address(address)) => {
            if event.account() != Some(address) {
                return Err(Rejection::Scope);
            }
        }
        (_, Scope::Global) => return Err(Rejection::Scope),
    }

    if let Some(assets) = &spec.assets {
        let instrument = event.instrument();
        if !assets.iter().any(|pattern| asset_matches(pattern, instrument)) {
            return Err(Rejection::Asset);
        }
    }

    if !spec.direction.admits(event.direction()) {
        return Err(Rejection::Direction);
    }

    // A TWAP order is announced before it has executed anything.
    let sized = !matches!(event, CanonicalEvent::Twap(_));
    if sized && event.notional_usd() < spec.min_notional_usd {
        return Err(Rejection::Notional);
    }

    if let Some(kind) = event.notification_type() {
        if !notification_enabled(kind, &spec.notify_on) {
            return Err(Rejection::NotificationType);
        }
    }

    Ok(())
}

/// `Open` fills are also covered by the catch-all `Fill` type.
fn notification_enabled(kind: NotificationType, enabled: &[NotificationType]) -> bool {
    match kind {
        NotificationType::Open => {
            enabled.contains(&NotificationType::Open) || enabled.contains(&NotificationType::Fill)
        }
        other => enabled.contains(&other),
    }
}

/// Case-insensitive match on the base asset, `*` matches anything.
pub fn asset_matches(pattern: &str, instrument: &str) -> bool {
    let pattern = pattern.trim();
    if pattern == "*" {
        return true;
    }
    if pattern.eq_ignore_ascii_case(instrument) {
        return true;
    }
    let base = base_asset(instrument);
    !base.is_empty() && base == base_asset(pattern)
}

/// `BTCUSDT`, `BTC-PERP`, `btc_usdt` and `BTC/USDC` all reduce to `BTC`.
pub fn base_asset(instrument: &str) -> String {
    let head = instrument
        .split(['-', '/', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    for quote in ["USDT", "USDC", "PERP", "USD"] {
        match head.strip_suffix(quote) {
            Some(base) if !base.is_empty() => return base.to_string(),
            _ => {}
        }
    }
    head
}
