//! Order payment state machine.

use serde::{Deserialize, Serialize};

use super::OrderError;

/// The payment status of an order.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Paid    (terminal)
///           └──► Failed  (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Checkout session opened, payment not yet confirmed.
    #[default]
    Pending,

    /// Payment confirmed by the provider (terminal state).
    Paid,

    /// Session expired or payment failed (terminal state).
    Failed,
}

/// Outcome reported by the payment provider for a checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Paid,
    Failed,
}

impl PaymentOutcome {
    /// Returns the status an order moves to when this outcome is applied.
    pub fn target_status(&self) -> OrderStatus {
        match self {
            PaymentOutcome::Paid => OrderStatus::Paid,
            PaymentOutcome::Failed => OrderStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Paid => "paid",
            PaymentOutcome::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a payment outcome treats an order that already left `Pending`.
///
/// `ForwardOnly` keeps terminal states sticky. `LastWriteWins` lets a later
/// outcome overwrite a terminal status, e.g. a late "expired" notification
/// turning `Paid` into `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    #[default]
    ForwardOnly,
    LastWriteWins,
}

impl TransitionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionPolicy::ForwardOnly => "forward_only",
            TransitionPolicy::LastWriteWins => "last_write_wins",
        }
    }
}

impl std::str::FromStr for TransitionPolicy {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward_only" => Ok(TransitionPolicy::ForwardOnly),
            "last_write_wins" => Ok(TransitionPolicy::LastWriteWins),
            other => Err(OrderError::UnknownPolicy {
                value: other.to_string(),
            }),
        }
    }
}

/// Decision produced by [`OrderStatus::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status changes to the contained value.
    Apply(OrderStatus),
    /// The write is a no-op.
    Unchanged,
}

impl OrderStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Failed)
    }

    /// Returns true if the order entitles its buyer to the asset.
    pub fn is_paid(&self) -> bool {
        matches!(self, OrderStatus::Paid)
    }

    /// Decides what applying `outcome` does to an order in this state.
    ///
    /// Re-applying the outcome an order already carries is always a no-op,
    /// so duplicate deliveries converge on the same final state.
    pub fn transition(&self, outcome: PaymentOutcome, policy: TransitionPolicy) -> Transition {
        let target = outcome.target_status();
        if *self == target {
            return Transition::Unchanged;
        }
        match (self, policy) {
            (OrderStatus::Pending, _) => Transition::Apply(target),
            (_, TransitionPolicy::LastWriteWins) => Transition::Apply(target),
            (_, TransitionPolicy::ForwardOnly) => Transition::Unchanged,
        }
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "failed" => Ok(OrderStatus::Failed),
            other => Err(OrderError::UnknownStatus {
                value: other.to_string(),
            }),
        }
    }
}
