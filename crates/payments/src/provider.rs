//! Payment provider trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BuyerId, ProductId, SessionId};
use domain::{Money, PaymentOutcome};

use crate::error::PaymentError;

/// Everything the provider needs to open a hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub buyer_id: BuyerId,
    pub product_id: ProductId,
    pub title: String,
    pub description: Option<String>,
    pub amount: Money,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// A checkout session opened by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: SessionId,
    pub url: String,
}

/// Lifecycle of a provider session as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Complete,
    Expired,
}

/// A provider session, as seen when listing sessions for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub id: SessionId,
    pub state: SessionState,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub buyer_id: Option<BuyerId>,
    pub product_id: Option<ProductId>,
}

impl ProviderSession {
    /// The payment outcome this session has settled on, if any.
    ///
    /// A completed session whose payment is still processing has no outcome yet.
    pub fn outcome(&self) -> Option<PaymentOutcome> {
        match (self.state, self.paid) {
            (SessionState::Complete, true) => Some(PaymentOutcome::Paid),
            (SessionState::Expired, _) => Some(PaymentOutcome::Failed),
            _ => None,
        }
    }
}

/// Trait for payment provider operations.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Opens a hosted checkout session for one product.
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Lists sessions created at or after `created_after`.
    async fn list_sessions(
        &self,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<ProviderSession>, PaymentError>;

    /// Fetches one session by id. `None` if the provider does not know it.
    async fn retrieve_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ProviderSession>, PaymentError>;
}

#[derive(Debug, Default)]
struct InMemoryProviderState {
    sessions: HashMap<SessionId, (CheckoutRequest, ProviderSession)>,
    next_id: u32,
    fail_on_create: bool,
    delay: Option<Duration>,
}

/// In-memory payment provider for testing and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentProvider {
    state: Arc<RwLock<InMemoryProviderState>>,
}

impl InMemoryPaymentProvider {
    /// Creates a new in-memory payment provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the provider to reject session creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_on_create = fail;
        }
    }

    /// Delays every call by `delay`, to exercise caller timeouts.
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut state) = self.state.write() {
            state.delay = delay;
        }
    }

    /// Returns the number of sessions opened so far.
    pub fn session_count(&self) -> usize {
        self.state.read().map(|s| s.sessions.len()).unwrap_or(0)
    }

    /// Returns the request that opened the session, if it exists.
    pub fn request_for(&self, session_id: &SessionId) -> Option<CheckoutRequest> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.sessions.get(session_id).map(|(req, _)| req.clone()))
    }

    /// Moves a session to a new provider-side state.
    pub fn settle(&self, session_id: &SessionId, session_state: SessionState, paid: bool) -> bool {
        let Ok(mut state) = self.state.write() else {
            return false;
        };
        match state.sessions.get_mut(session_id) {
            Some((_, session)) => {
                session.state = session_state;
                session.paid = paid;
                true
            }
            None => false,
        }
    }

    /// Overrides the creation time of a session, to simulate old sessions.
    pub fn backdate(&self, session_id: &SessionId, created_at: DateTime<Utc>) -> bool {
        let Ok(mut state) = self.state.write() else {
            return false;
        };
        match state.sessions.get_mut(session_id) {
            Some((_, session)) => {
                session.created_at = created_at;
                true
            }
            None => false,
        }
    }

    fn delay(&self) -> Option<Duration> {
        self.state.read().ok().and_then(|s| s.delay)
    }
}

#[async_trait]
impl PaymentProvider for InMemoryPaymentProvider {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| PaymentError::Provider("provider state poisoned".to_string()))?;

        if state.fail_on_create {
            return Err(PaymentError::Provider("Session creation declined".to_string()));
        }

        state.next_id += 1;
        let id = SessionId::new(format!("cs_test_{:04}", state.next_id));
        let session = ProviderSession {
            id: id.clone(),
            state: SessionState::Open,
            paid: false,
            created_at: Utc::now(),
            buyer_id: Some(request.buyer_id.clone()),
            product_id: Some(request.product_id.clone()),
        };
        state.sessions.insert(id.clone(), (request, session));

        Ok(CheckoutSession {
            url: format!("https://checkout.test/pay/{id}"),
            id,
        })
    }

    async fn list_sessions(
        &self,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<ProviderSession>, PaymentError> {
        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }

        let state = self
            .state
            .read()
            .map_err(|_| PaymentError::Provider("provider state poisoned".to_string()))?;

        let mut sessions: Vec<_> = state
            .sessions
            .values()
            .map(|(_, session)| session.clone())
            .filter(|s| s.created_at >= created_after)
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn retrieve_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ProviderSession>, PaymentError> {
        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }

        let state = self
            .state
            .read()
            .map_err(|_| PaymentError::Provider("provider state poisoned".to_string()))?;

        Ok(state
            .sessions
            .get(session_id)
            .map(|(_, session)| session.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            buyer_id: BuyerId::from("buyer-1"),
            product_id: ProductId::from("prod-1"),
            title: "Ebook".to_string(),
            description: None,
            amount: Money::from_cents(500),
            currency: "usd".to_string(),
            success_url: "http://localhost/success".to_string(),
            cancel_url: "http://localhost/cancel".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sequential_session_ids() {
        let provider = InMemoryPaymentProvider::new();

        let s1 = provider.create_checkout_session(request()).await.unwrap();
        let s2 = provider.create_checkout_session(request()).await.unwrap();

        assert_eq!(s1.id.as_str(), "cs_test_0001");
        assert_eq!(s2.id.as_str(), "cs_test_0002");
        assert!(s1.url.ends_with("cs_test_0001"));
        assert_eq!(provider.session_count(), 2);
    }

    #[tokio::test]
    async fn test_fail_on_create() {
        let provider = InMemoryPaymentProvider::new();
        provider.set_fail_on_create(true);

        let result = provider.create_checkout_session(request()).await;

        assert!(matches!(result, Err(PaymentError::Provider(_))));
        assert_eq!(provider.session_count(), 0);
    }

    #[tokio::test]
    async fn test_settle_changes_listed_outcome() {
        let provider = InMemoryPaymentProvider::new();
        let session = provider.create_checkout_session(request()).await.unwrap();

        let listed = provider.list_sessions(DateTime::<Utc>::MIN_UTC).await.unwrap();
        assert_eq!(listed[0].outcome(), None);

        assert!(provider.settle(&session.id, SessionState::Complete, true));
        let listed = provider.list_sessions(DateTime::<Utc>::MIN_UTC).await.unwrap();
        assert_eq!(listed[0].outcome(), Some(PaymentOutcome::Paid));
    }

    #[tokio::test]
    async fn test_retrieve_and_backdate_session() {
        let provider = InMemoryPaymentProvider::new();
        let session = provider.create_checkout_session(request()).await.unwrap();
        let long_ago = Utc::now() - chrono::Duration::days(3);

        assert!(provider.backdate(&session.id, long_ago));

        let found = provider.retrieve_session(&session.id).await.unwrap().unwrap();
        assert_eq!(found.created_at, long_ago);
        assert!(
            provider
                .retrieve_session(&SessionId::from("cs_missing"))
                .await
                .unwrap()
                .is_none()
        );
        let recent = provider
            .list_sessions(Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert!(recent.is_empty());
    }

    #[test]
    fn test_outcome_mapping() {
        let mut session = ProviderSession {
            id: SessionId::from("cs_1"),
            state: SessionState::Complete,
            paid: false,
            created_at: Utc::now(),
            buyer_id: None,
            product_id: None,
        };
        assert_eq!(session.outcome(), None);

        session.state = SessionState::Expired;
        assert_eq!(session.outcome(), Some(PaymentOutcome::Failed));

        session.state = SessionState::Open;
        assert_eq!(session.outcome(), None);
    }
}
