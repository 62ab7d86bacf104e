pub mod checkout;
pub mod downloads;
pub mod health;
pub mod metrics;
pub mod webhooks;
