//! Token issuance and redemption.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{BuyerId, OrderId};
use domain::{Order, Product};
use order_store::{OrderStore, ProductStore};

use crate::error::{Denial, DownloadError};
use crate::storage::{AssetDelivery, AssetStorage};
use crate::token::TokenIssuer;

/// A freshly minted download token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: Duration,
}

/// Gates asset downloads behind paid, owned orders.
#[derive(Clone)]
pub struct DownloadService {
    orders: Arc<dyn OrderStore>,
    products: Arc<dyn ProductStore>,
    tokens: Option<TokenIssuer>,
    storage: Arc<dyn AssetStorage>,
    timeout: Duration,
}

impl DownloadService {
    /// Creates the service. Without a token issuer every issue and redeem call
    /// fails with [`DownloadError::NotConfigured`].
    pub fn new(
        orders: Arc<dyn OrderStore>,
        products: Arc<dyn ProductStore>,
        tokens: Option<TokenIssuer>,
        storage: Arc<dyn AssetStorage>,
        timeout: Duration,
    ) -> Self {
        Self {
            orders,
            products,
            tokens,
            storage,
            timeout,
        }
    }

    /// Mints a download token for `order_id` if `caller` owns it and it is paid.
    #[tracing::instrument(skip_all, fields(%caller, %order_id))]
    pub async fn issue_token(
        &self,
        caller: &BuyerId,
        order_id: OrderId,
    ) -> Result<IssuedToken, DownloadError> {
        let order = self.load_entitled_order(caller, order_id).await?;
        let tokens = self.tokens.as_ref().ok_or(DownloadError::NotConfigured)?;
        let product = self.load_product(&order).await?;

        let token = tokens.mint(order.id, product.id.clone(), product.asset_key.as_str())?;

        tracing::info!(order_id = %order.id, product_id = %product.id, "download token issued");
        metrics::counter!("download_tokens_issued_total").increment(1);

        Ok(IssuedToken {
            token,
            expires_in: tokens.ttl(),
        })
    }

    /// Redeems a download token for the asset it grants.
    ///
    /// The token only names an order. Ownership and payment status are
    /// re-read from the order store, so a token minted before a status
    /// change stops working as soon as the change lands.
    #[tracing::instrument(skip_all, fields(%caller))]
    pub async fn redeem(
        &self,
        caller: &BuyerId,
        token: &str,
    ) -> Result<AssetDelivery, DownloadError> {
        let result = self.redeem_inner(caller, token).await;

        let label = match &result {
            Ok(_) => "served",
            Err(DownloadError::InvalidToken(_)) => "invalid_token",
            Err(DownloadError::Forbidden(_)) => "forbidden",
            Err(DownloadError::OrderNotFound | DownloadError::AssetNotFound) => "not_found",
            Err(_) => "error",
        };
        metrics::counter!("download_redemptions_total", "result" => label).increment(1);

        result
    }

    async fn redeem_inner(
        &self,
        caller: &BuyerId,
        token: &str,
    ) -> Result<AssetDelivery, DownloadError> {
        let tokens = self.tokens.as_ref().ok_or(DownloadError::NotConfigured)?;

        let claims = tokens
            .verify_at(token, Utc::now().timestamp())
            .into_result()
            .map_err(|rejection| {
                tracing::info!(reason = rejection.as_str(), "download token refused");
                DownloadError::InvalidToken(rejection)
            })?;

        let order = self.load_entitled_order(caller, claims.order_id).await?;
        if claims.product_id != order.product_id {
            tracing::warn!(order_id = %order.id, "download token product does not match order");
            return Err(DownloadError::Forbidden(Denial::TokenMismatch));
        }

        let product = self.load_product(&order).await?;
        if product.asset_key.as_str() != claims.asset_key {
            tracing::debug!(order_id = %order.id, "asset key changed since token was minted");
        }

        let delivery = tokio::time::timeout(self.timeout, self.storage.open(&product.asset_key))
            .await
            .map_err(|_| DownloadError::Timeout(self.timeout))?
            .inspect_err(|e| {
                if e.is_integrity_violation() {
                    tracing::error!(
                        order_id = %order.id,
                        product_id = %product.id,
                        error = %e,
                        "product asset key failed storage validation"
                    );
                    metrics::counter!("download_integrity_violations_total").increment(1);
                }
            })?;

        tracing::info!(
            order_id = %order.id,
            backend = self.storage.backend(),
            "asset delivered"
        );
        Ok(delivery)
    }

    /// Loads an order and checks, in order, that it exists, that `caller`
    /// owns it, and that it is paid.
    async fn load_entitled_order(
        &self,
        caller: &BuyerId,
        order_id: OrderId,
    ) -> Result<Order, DownloadError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(DownloadError::OrderNotFound)?;

        if !order.is_owned_by(caller) {
            tracing::warn!(%order_id, "caller does not own order");
            return Err(DownloadError::Forbidden(Denial::NotOwner));
        }
        if !order.is_paid() {
            return Err(DownloadError::Forbidden(Denial::NotPaid));
        }

        Ok(order)
    }

    async fn load_product(&self, order: &Order) -> Result<Product, DownloadError> {
        self.products
            .get_product(&order.product_id)
            .await?
            .ok_or_else(|| {
                tracing::error!(order_id = %order.id, product_id = %order.product_id, "paid order references missing product");
                DownloadError::AssetNotFound
            })
    }
}
