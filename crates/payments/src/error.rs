//! Payment error types.

use std::time::Duration;

use common::{ProductId, SessionId};
use order_store::OrderStoreError;
use thiserror::Error;

/// Errors raised while opening checkout sessions or talking to the provider.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The requested product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Provider credentials or redirect URLs are missing.
    #[error("Payment provider is not configured: {0}")]
    NotConfigured(&'static str),

    /// The provider rejected the call or returned something unreadable.
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// The provider did not answer within the configured bound.
    #[error("Payment provider timed out after {0:?}")]
    Timeout(Duration),

    /// A provider session was opened but its order could not be recorded.
    #[error("Order for session {session_id} was not recorded: {source}")]
    OrderNotRecorded {
        session_id: SessionId,
        #[source]
        source: OrderStoreError,
    },

    /// Order or product store error.
    #[error("Order store error: {0}")]
    Store(#[from] OrderStoreError),

    /// Transport error talking to the provider.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PaymentError {
    /// Returns true when the caller may safely retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::Timeout(_))
    }
}

/// Errors raised while verifying and applying a webhook notification.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No signing secret is configured; every notification is refused.
    #[error("Webhook signing secret is not configured")]
    NotConfigured,

    /// The request carried no signature header.
    #[error("Missing signature header")]
    MissingSignature,

    /// The signature header could not be parsed.
    #[error("Malformed signature header: {0}")]
    MalformedHeader(&'static str),

    /// No signature in the header matched the payload.
    #[error("Signature mismatch")]
    InvalidSignature,

    /// The signed timestamp is outside the accepted window.
    #[error("Timestamp outside tolerance")]
    TimestampOutOfRange,

    /// The verified payload is not a well-formed event.
    #[error("Malformed event payload: {0}")]
    MalformedPayload(String),

    /// Order store error.
    #[error("Order store error: {0}")]
    Store(#[from] OrderStoreError),
}
