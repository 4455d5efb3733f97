//! Subscriber filter document.
//!
//! A [`FilterSpec`] is immutable once registered: updates replace the whole
//! document. Every field has a default so that documents written by older
//! versions load with the missing fields filled in.

use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::venues::{Direction, Venue};

/// Current schema version written by [`FilterSpec::normalized`].
pub const FILTER_SPEC_VERSION: u32 = 1;

/// Direction criterion of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionFilter {
    Long,
    Short,
    #[default]
    Both,
}

impl DirectionFilter {
    /// Whether an event with the given direction passes.
    ///
    /// Events that carry no direction (deposits, withdrawals) always pass.
    pub fn admits(&self, direction: Option<Direction>) -> bool {
        match (self, direction) {
            (DirectionFilter::Both, _) | (_, None) => true,
            (DirectionFilter::Long, Some(d)) => d == Direction::Long,
            (DirectionFilter::Short, Some(d)) => d == Direction::Short,
        }
    }
}

/// Kinds of account activity a subscriber can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Open,
    Close,
    Fill,
    Liquidation,
    Funding,
    Deposit,
    Withdrawal,
    /// TWAP order activated or terminated.
    Twap,
}

impl NotificationType {
    pub const ALL: [NotificationType; 8] = [
        NotificationType::Open,
        NotificationType::Close,
        NotificationType::Fill,
        NotificationType::Liquidation,
        NotificationType::Funding,
        NotificationType::Deposit,
        NotificationType::Withdrawal,
        NotificationType::Twap,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterSpecError {
    #[error("minimum notional must not be negative, got {0}")]
    NegativeNotional(Decimal),
    #[error("unsupported filter version {0}")]
    UnsupportedVersion(u32),
}

/// Declarative criteria deciding which events a subscriber receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// Schema version. Documents without one are treated as version 0.
    pub version: u32,
    /// Asset or pair allow-set. `None` admits everything.
    pub assets: Option<Vec<CompactString>>,
    pub direction: DirectionFilter,
    pub min_notional_usd: Decimal,
    /// Venues a liquidation must come from. Ignored for account events.
    pub venues: SmallVec<[Venue; 4]>,
    /// Account activity kinds to forward. Ignored for liquidations.
    pub notify_on: SmallVec<[NotificationType; 8]>,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            version: 0,
            assets: None,
            direction: DirectionFilter::Both,
            min_notional_usd: Decimal::ZERO,
            venues: SmallVec::from_slice(&Venue::ALL),
            notify_on: SmallVec::from_slice(&NotificationType::ALL),
        }
    }
}

impl FilterSpec {
    /// Validate and bring the document to the current schema.
    ///
    /// Asset names are uppercased and deduplicated; an empty asset list is
    /// the same as no list at all.
    pub fn normalized(mut self) -> Result<Self, FilterSpecError> {
        if self.version > FILTER_SPEC_VERSION {
            return Err(FilterSpecError::UnsupportedVersion(self.version));
        }
        if self.min_notional_usd.is_sign_negative() && !self.min_notional_usd.is_zero() {
            return Err(FilterSpecError::NegativeNotional(self.min_notional_usd));
        }
        self.assets = self.assets.and_then(|assets| {
            let mut upper: Vec<CompactString> = assets
                .into_iter()
                .map(|a| a.trim().to_ascii_uppercase().into())
                .filter(|a: &CompactString| !a.is_empty())
                .collect();
            upper.sort();
            upper.dedup();
            (!upper.is_empty()).then_some(upper)
        });
        self.venues.sort();
        self.venues.dedup();
        self.notify_on.sort();
        self.notify_on.dedup();
        self.version = FILTER_SPEC_VERSION;
        Ok(self)
    }

    pub fn with_min_notional(mut self, min_notional_usd: Decimal) -> Self {
        self.min_notional_usd = min_notional_usd;
        self
    }

    pub fn with_venues(mut self, venues: &[Venue]) -> Self {
        self.venues = SmallVec::from_slice(venues);
        self
    }

    pub fn with_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        self.assets = Some(assets.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_direction(mut self, direction: DirectionFilter) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_notify_on(mut self, kinds: &[NotificationType]) -> Self {
        self.notify_on = SmallVec::from_slice(kinds);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_are_default_filled() {
        let spec: FilterSpec = serde_json::from_str(r#"{"min_notional_usd": "25000"}"#).unwrap();
        assert_eq!(spec.version, 0);
        assert_eq!(spec.assets, None);
        assert_eq!(spec.direction, DirectionFilter::Both);
        assert_eq!(spec.min_notional_usd, Decimal::from(25_000));
        assert_eq!(spec.venues.as_slice(), &Venue::ALL);
        assert_eq!(spec.notify_on.len(), NotificationType::ALL.len());

        let spec = spec.normalized().unwrap();
        assert_eq!(spec.version, FILTER_SPEC_VERSION);
    }

    #[test]
    fn test_normalized_cleans_assets() {
        let spec = FilterSpec::default()
            .with_assets(["eth", " BTC", "eth", ""])
            .normalized()
            .unwrap();
        assert_eq!(
            spec.assets,
            Some(vec![CompactString::from("BTC"), CompactString::from("ETH")])
        );

        let spec = FilterSpec::default()
            .with_assets(Vec::<String>::new())
            .normalized()
            .unwrap();
        assert_eq!(spec.assets, None);
    }

    #[test]
    fn test_negative_notional_is_rejected() {
        let err = FilterSpec::default()
            .with_min_notional(Decimal::from(-1))
            .normalized()
            .unwrap_err();
        assert_eq!(err, FilterSpecError::NegativeNotional(Decimal::from(-1)));
    }

    #[test]
    fn test_future_version_is_rejected() {
        let spec = FilterSpec {
            version: FILTER_SPEC_VERSION + 1,
            ..FilterSpec::default()
        };
        assert!(matches!(
            spec.normalized(),
            Err(FilterSpecError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_direction_filter_admits() {
        assert!(DirectionFilter::Both.admits(Some(Direction::Short)));
        assert!(DirectionFilter::Long.admits(Some(Direction::Long)));
        assert!(!DirectionFilter::Long.admits(Some(Direction::Short)));
        assert!(!DirectionFilter::Short.admits(Some(Direction::Long)));
        assert!(DirectionFilter::Short.admits(None));
    }

    #[test]
    fn test_explicit_notify_on_keeps_twap_opt_in() {
        let spec: FilterSpec = serde_json::from_str(r#"{"notify_on": ["open", "close"]}"#).unwrap();
        assert!(!spec.notify_on.contains(&NotificationType::Twap));
        assert!(FilterSpec::default().notify_on.contains(&NotificationType::Twap));

        let twap: NotificationType = serde_json::from_str(r#""twap""#).unwrap();
        assert_eq!(twap, NotificationType::Twap);
    }
}
