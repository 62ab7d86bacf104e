//! Checkout session initiation.

use std::sync::Arc;
use std::time::Duration;

use common::{BuyerId, ProductId};
use domain::{NewOrder, Order};
use order_store::{OrderStore, ProductStore};

use crate::error::PaymentError;
use crate::provider::{CheckoutRequest, PaymentProvider};

/// Where the hosted checkout page sends the buyer afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectUrls {
    pub success_url: String,
    pub cancel_url: String,
}

impl RedirectUrls {
    /// Builds the success and cancel URLs under a client base URL.
    pub fn for_client(client_url: &str) -> Self {
        let base = client_url.trim_end_matches('/');
        Self {
            success_url: format!("{base}/purchase/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{base}/purchase/cancel"),
        }
    }
}

/// A checkout session together with the order recorded for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutStarted {
    pub url: String,
    pub order: Order,
}

/// Opens provider checkout sessions and records the matching pending order.
#[derive(Clone)]
pub struct CheckoutService {
    provider: Option<Arc<dyn PaymentProvider>>,
    redirects: Option<RedirectUrls>,
    products: Arc<dyn ProductStore>,
    orders: Arc<dyn OrderStore>,
    timeout: Duration,
}

impl CheckoutService {
    pub fn new(
        provider: Option<Arc<dyn PaymentProvider>>,
        redirects: Option<RedirectUrls>,
        products: Arc<dyn ProductStore>,
        orders: Arc<dyn OrderStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            redirects,
            products,
            orders,
            timeout,
        }
    }

    /// Opens a checkout session for `product_id` on behalf of `buyer_id`.
    ///
    /// The session is priced from the current product record, and that price
    /// is snapshotted onto the order. The order is keyed by the provider's
    /// session id, so a repeated call for the same session returns the
    /// existing order.
    #[tracing::instrument(skip_all, fields(%buyer_id, %product_id))]
    pub async fn start_checkout(
        &self,
        buyer_id: BuyerId,
        product_id: ProductId,
    ) -> Result<CheckoutStarted, PaymentError> {
        let product = self
            .products
            .get_product(&product_id)
            .await?
            .ok_or_else(|| PaymentError::ProductNotFound(product_id.clone()))?;

        let provider = self
            .provider
            .as_ref()
            .ok_or(PaymentError::NotConfigured("missing provider API key"))?;
        let redirects = self
            .redirects
            .as_ref()
            .ok_or(PaymentError::NotConfigured("missing client URL"))?;

        let request = CheckoutRequest {
            buyer_id: buyer_id.clone(),
            product_id: product.id.clone(),
            title: product.title.clone(),
            description: product.description.clone(),
            amount: product.price,
            currency: product.currency.clone(),
            success_url: redirects.success_url.clone(),
            cancel_url: redirects.cancel_url.clone(),
        };

        let session = tokio::time::timeout(self.timeout, provider.create_checkout_session(request))
            .await
            .map_err(|_| PaymentError::Timeout(self.timeout))??;

        let new_order = NewOrder {
            buyer_id,
            product_id: product.id,
            session_id: session.id.clone(),
            amount: product.price,
            currency: product.currency,
            product_title: product.title,
        };

        match self.orders.create_pending_order(new_order).await {
            Ok(order) => {
                tracing::info!(order_id = %order.id, session_id = %session.id, "checkout session opened");
                metrics::counter!("checkout_sessions_created_total").increment(1);
                Ok(CheckoutStarted {
                    url: session.url,
                    order,
                })
            }
            Err(source) => {
                tracing::error!(
                    session_id = %session.id,
                    error = %source,
                    "checkout session opened but order was not recorded; session needs reconciliation"
                );
                metrics::counter!("checkout_orphaned_sessions_total").increment(1);
                Err(PaymentError::OrderNotRecorded {
                    session_id: session.id,
                    source,
                })
            }
        }
    }
}
