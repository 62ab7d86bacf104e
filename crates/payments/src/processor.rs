//! Applies verified payment notifications to order state.

use std::sync::Arc;

use common::{OrderId, SessionId};
use domain::{OrderStatus, TransitionPolicy};
use order_store::{OrderStore, TransitionResult};

use crate::error::WebhookError;
use crate::webhook::{PaymentEvent, WebhookVerifier};

/// What a processed notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The order's status changed.
    Applied { order_id: OrderId, status: OrderStatus },
    /// The order already reflected the event, or its terminal state is protected.
    Unchanged { order_id: OrderId, status: OrderStatus },
    /// No order exists for the session; acknowledged and left for reconciliation.
    Unmatched { session_id: SessionId },
    /// The event kind drives no state change.
    Ignored { event_type: String },
}

/// Verifies and applies payment provider notifications.
#[derive(Clone)]
pub struct PaymentEventProcessor {
    verifier: Option<WebhookVerifier>,
    orders: Arc<dyn OrderStore>,
    policy: TransitionPolicy,
}

impl PaymentEventProcessor {
    /// Creates a processor. Without a verifier every notification is refused.
    pub fn new(
        verifier: Option<WebhookVerifier>,
        orders: Arc<dyn OrderStore>,
        policy: TransitionPolicy,
    ) -> Self {
        Self {
            verifier,
            orders,
            policy,
        }
    }

    /// Verifies `payload` against `signature` and applies the event it carries.
    ///
    /// `payload` must be the exact bytes received; re-serialized JSON will not verify.
    #[tracing::instrument(skip_all)]
    pub async fn process(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<ProcessOutcome, WebhookError> {
        let Some(verifier) = &self.verifier else {
            metrics::counter!("payment_webhooks_total", "result" => "misconfigured").increment(1);
            return Err(WebhookError::NotConfigured);
        };

        let signature = signature.ok_or(WebhookError::MissingSignature);
        if let Err(e) = signature.and_then(|sig| verifier.verify(payload, sig)) {
            tracing::warn!(error = %e, "rejected webhook with bad signature");
            metrics::counter!("payment_webhooks_total", "result" => "rejected").increment(1);
            return Err(e);
        }

        let event = PaymentEvent::parse(payload).inspect_err(|e| {
            tracing::warn!(error = %e, "rejected verified webhook with malformed body");
            metrics::counter!("payment_webhooks_total", "result" => "malformed").increment(1);
        })?;

        let outcome = self.apply(event).await?;

        let label = match &outcome {
            ProcessOutcome::Applied { .. } => "applied",
            ProcessOutcome::Unchanged { .. } => "unchanged",
            ProcessOutcome::Unmatched { .. } => "unmatched",
            ProcessOutcome::Ignored { .. } => "ignored",
        };
        metrics::counter!("payment_webhooks_total", "result" => label).increment(1);

        Ok(outcome)
    }

    async fn apply(&self, event: PaymentEvent) -> Result<ProcessOutcome, WebhookError> {
        let (Some(outcome), Some(session_id)) = (event.outcome(), event.session_id.clone()) else {
            let event_type = event.kind.as_str().to_string();
            tracing::debug!(event_id = ?event.event_id, %event_type, "ignoring payment event");
            return Ok(ProcessOutcome::Ignored { event_type });
        };

        let result = self
            .orders
            .apply_payment_outcome(&session_id, outcome, self.policy)
            .await?;

        Ok(match result {
            TransitionResult::Applied(order) => {
                tracing::info!(
                    order_id = %order.id,
                    %session_id,
                    status = %order.status,
                    "order status updated from payment event"
                );
                ProcessOutcome::Applied {
                    order_id: order.id,
                    status: order.status,
                }
            }
            TransitionResult::Unchanged(order) => {
                tracing::debug!(
                    order_id = %order.id,
                    %session_id,
                    status = %order.status,
                    outcome = outcome.as_str(),
                    "payment event left order unchanged"
                );
                ProcessOutcome::Unchanged {
                    order_id: order.id,
                    status: order.status,
                }
            }
            TransitionResult::NoMatchingOrder => {
                tracing::warn!(
                    %session_id,
                    event_id = ?event.event_id,
                    outcome = outcome.as_str(),
                    "payment event for unknown session; needs reconciliation"
                );
                metrics::counter!("payment_events_unmatched_total").increment(1);
                ProcessOutcome::Unmatched { session_id }
            }
        })
    }
}
