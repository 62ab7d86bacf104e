//! Domain layer for the paid-download gate.
//!
//! This crate provides:
//! - The `Order` record and its payment state machine
//! - `PaymentOutcome` and the `TransitionPolicy` that governs terminal states
//! - The `Product` view used at checkout and at asset resolution

pub mod order;
pub mod product;

pub use order::{
    AssetKey, Money, NewOrder, Order, OrderError, OrderStatus, PaymentOutcome, Transition,
    TransitionPolicy,
};
pub use product::Product;
