//! Payment provider integration.
//!
//! Opens hosted checkout sessions, verifies and applies the provider's
//! asynchronous notifications, and reconciles provider sessions against
//! recorded orders.

pub mod checkout;
pub mod error;
pub mod processor;
pub mod provider;
pub mod reconcile;
pub mod stripe;
pub mod webhook;

pub use checkout::{CheckoutService, CheckoutStarted, RedirectUrls};
pub use error::{PaymentError, WebhookError};
pub use processor::{PaymentEventProcessor, ProcessOutcome};
pub use provider::{
    CheckoutRequest, CheckoutSession, InMemoryPaymentProvider, PaymentProvider, ProviderSession,
    SessionState,
};
pub use reconcile::{ReconciliationReport, Reconciler};
pub use stripe::{StripeConfig, StripePaymentProvider};
pub use webhook::{EventKind, PaymentEvent, SIGNATURE_HEADER, SignatureHeader, WebhookVerifier};
