//! Order record, payment state machine, and related types.

mod entity;
mod state;
mod value_objects;

pub use entity::{NewOrder, Order};
pub use state::{OrderStatus, PaymentOutcome, Transition, TransitionPolicy};
pub use value_objects::{AssetKey, Money};

use thiserror::Error;

/// Errors raised while interpreting order data.
#[derive(Debug, Error)]
pub enum OrderError {
    /// A stored or configured status string is not a known status.
    #[error("Unknown order status: {value}")]
    UnknownStatus { value: String },

    /// A configured transition policy is not recognized.
    #[error("Unknown transition policy: {value}")]
    UnknownPolicy { value: String },
}
