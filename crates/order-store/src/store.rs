use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, SessionId};
use domain::{NewOrder, Order, PaymentOutcome, Product, TransitionPolicy};

use crate::Result;

/// Result of applying a payment outcome to the order behind a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// The status changed; contains the order after the write.
    Applied(Order),
    /// The order already carried the outcome, or its terminal state is
    /// protected by the policy. Contains the current order.
    Unchanged(Order),
    /// No order exists for the session. Nothing was written; the session
    /// needs reconciliation.
    NoMatchingOrder,
}

impl TransitionResult {
    /// Returns the order after the operation, if one exists.
    pub fn order(&self) -> Option<&Order> {
        match self {
            TransitionResult::Applied(order) | TransitionResult::Unchanged(order) => Some(order),
            TransitionResult::NoMatchingOrder => None,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionResult::Applied(_))
    }
}

/// Persistence and atomic state transitions for orders.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Creates a `Pending` order for the session, or returns the existing one.
    ///
    /// Find-or-create keyed by `session_id`: concurrent calls for the same
    /// session yield exactly one row, and every caller gets that row back.
    async fn create_pending_order(&self, new: NewOrder) -> Result<Order>;

    /// Atomically applies `outcome` to the order behind `session_id`.
    ///
    /// Safe under duplicate and concurrent delivery: applying the same
    /// outcome twice leaves the same state as applying it once. A missing
    /// order is reported as [`TransitionResult::NoMatchingOrder`], never as
    /// an error, and no order is created.
    async fn apply_payment_outcome(
        &self,
        session_id: &SessionId,
        outcome: PaymentOutcome,
        policy: TransitionPolicy,
    ) -> Result<TransitionResult>;

    /// Loads an order by id, including its ownership fields.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads the order recorded for a payment session.
    async fn find_by_session(&self, session_id: &SessionId) -> Result<Option<Order>>;

    /// Lists orders still `Pending` that were created before `created_before`.
    async fn list_pending(&self, created_before: DateTime<Utc>) -> Result<Vec<Order>>;
}

/// Read access to the product catalog.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>>;
}
