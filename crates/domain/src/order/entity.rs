//! The persisted order record.

use chrono::{DateTime, Utc};
use common::{BuyerId, OrderId, ProductId, SessionId};
use serde::{Deserialize, Serialize};

use super::{Money, OrderStatus, PaymentOutcome, Transition, TransitionPolicy};

/// Input for creating a pending order at checkout time.
///
/// Price, currency and title are a snapshot of the product at the moment the
/// payment session was opened; later catalog edits do not touch the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub buyer_id: BuyerId,
    pub product_id: ProductId,
    pub session_id: SessionId,
    pub amount: Money,
    pub currency: String,
    pub product_title: String,
}

/// One buyer's attempt to purchase one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub session_id: SessionId,
    pub buyer_id: BuyerId,
    pub product_id: ProductId,
    pub status: OrderStatus,
    pub amount: Money,
    pub currency: String,
    pub product_title: String,
    /// Incremented on every status write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a fresh `Pending` order with a server-generated id.
    pub fn pending(new: NewOrder, now: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::new(),
            session_id: new.session_id,
            buyer_id: new.buyer_id,
            product_id: new.product_id,
            status: OrderStatus::Pending,
            amount: new.amount,
            currency: new.currency,
            product_title: new.product_title,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if `buyer` is exactly the buyer recorded on the order.
    pub fn is_owned_by(&self, buyer: &BuyerId) -> bool {
        &self.buyer_id == buyer
    }

    pub fn is_paid(&self) -> bool {
        self.status.is_paid()
    }

    /// Applies a payment outcome in place.
    ///
    /// Returns true when the status changed. The version only moves on a
    /// real change.
    pub fn apply_outcome(
        &mut self,
        outcome: PaymentOutcome,
        policy: TransitionPolicy,
        now: DateTime<Utc>,
    ) -> bool {
        match self.status.transition(outcome, policy) {
            Transition::Apply(next) => {
                self.status = next;
                self.version += 1;
                self.updated_at = now;
                true
            }
            Transition::Unchanged => false,
        }
    }
}
