//! Value objects for the order domain.

use serde::{Deserialize, Serialize};

/// Money amount represented in minor units (cents) to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns the amount in minor units, as sent to the payment provider.
    pub fn cents(&self) -> i64 {
        self.cents
    }
}

/// Opaque key of a stored digital asset.
///
/// Only the asset storage layer turns a key into a path or URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetKey(String);

impl AssetKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for AssetKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AssetKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}
