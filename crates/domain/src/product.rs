//! Catalog product as seen by the purchase flow.

use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::order::{AssetKey, Money};

/// A purchasable digital good.
///
/// Owned by the product store. Orders reference products by id only and
/// never embed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub description: Option<String>,
    /// Current list price. Checkout snapshots it into the order.
    pub price: Money,
    pub currency: String,
    pub asset_key: AssetKey,
}

impl Product {
    /// Creates a product priced in US dollars.
    pub fn new(
        id: impl Into<ProductId>,
        title: impl Into<String>,
        price: Money,
        asset_key: impl Into<AssetKey>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            price,
            currency: "usd".to_string(),
            asset_key: asset_key.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
