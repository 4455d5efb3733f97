//! Identities used to key subscriptions.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Owner identity of a subscription (the chat the notifications go to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub i64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriberId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(SubscriberId)
    }
}

/// An EVM-style account address, always stored lowercase.
///
/// Venues echo addresses back in mixed case, so every comparison goes
/// through the normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(CompactString);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must have 40 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("address contains a non-hex character")]
    InvalidCharacter,
}

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened display form, e.g. `0x1234...abcd`.
    pub fn short(&self) -> String {
        let s = self.0.as_str();
        if s.len() <= 12 {
            return s.to_owned();
        }
        format!("{}...{}", &s[..6], &s[s.len() - 4..])
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) else {
            return Err(AddressParseError::MissingPrefix);
        };
        if hex.len() != 40 {
            return Err(AddressParseError::InvalidLength(hex.len()));
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressParseError::InvalidCharacter);
        }
        let mut normalized = CompactString::with_capacity(42);
        normalized.push_str("0x");
        normalized.push_str(&hex.to_ascii_lowercase());
        Ok(Address(normalized))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0.into_string()
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a subscription listens to: one account, or venue-wide liquidations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address", rename_all = "snake_case")]
pub enum Scope {
    Address(Address),
    Global,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Address(address) => write!(f, "address:{address}"),
            Scope::Global => write!(f, "global"),
        }
    }
}
