//! Persistence for orders and products.
//!
//! The order store owns order rows and is the only component allowed to
//! change an order's payment status. Every status write is a conditional,
//! atomic update keyed by the payment session id.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{OrderStoreError, Result};
pub use memory::{InMemoryOrderStore, InMemoryProductStore};
pub use postgres::PostgresStore;
pub use store::{OrderStore, ProductStore, TransitionResult};
