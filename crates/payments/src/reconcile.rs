//! Provider-versus-store reconciliation.
//!
//! Webhook delivery is at-least-once but not guaranteed to arrive, and a
//! checkout can open a provider session whose order write then fails. The
//! reconciler lists recent provider sessions and compares them with the
//! order store. Pending orders older than the listing window are looked up
//! one session at a time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{OrderId, SessionId};
use domain::{PaymentOutcome, TransitionPolicy};
use order_store::{OrderStore, TransitionResult};
use tokio::task::JoinHandle;

use crate::error::PaymentError;
use crate::provider::{PaymentProvider, ProviderSession};

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub sessions_checked: usize,
    /// Pending orders created before the listing window.
    pub stale_orders_checked: usize,
    /// Provider sessions with no recorded order.
    pub orphaned_sessions: Vec<SessionId>,
    /// Pending orders settled from the provider's view of their session.
    pub settled_orders: Vec<OrderId>,
}

/// Periodically compares provider sessions with recorded orders.
#[derive(Clone)]
pub struct Reconciler {
    provider: Arc<dyn PaymentProvider>,
    orders: Arc<dyn OrderStore>,
    policy: TransitionPolicy,
    lookback: chrono::Duration,
    timeout: Duration,
}

impl Reconciler {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        orders: Arc<dyn OrderStore>,
        policy: TransitionPolicy,
        lookback: chrono::Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            orders,
            policy,
            lookback,
            timeout,
        }
    }

    /// Runs a single reconciliation pass.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<ReconciliationReport, PaymentError> {
        let since = Utc::now()
            .checked_sub_signed(self.lookback)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let sessions = self.bounded(self.provider.list_sessions(since)).await?;

        let mut report = ReconciliationReport {
            sessions_checked: sessions.len(),
            ..Default::default()
        };

        for session in sessions {
            let Some(order) = self.orders.find_by_session(&session.id).await? else {
                tracing::warn!(
                    session_id = %session.id,
                    buyer_id = ?session.buyer_id,
                    product_id = ?session.product_id,
                    "provider session has no recorded order"
                );
                metrics::counter!("reconcile_orphaned_sessions_total").increment(1);
                report.orphaned_sessions.push(session.id);
                continue;
            };

            if order.status.is_terminal() {
                continue;
            }
            if let Some(outcome) = session.outcome() {
                self.settle(&session.id, outcome, &mut report).await?;
            }
        }

        let stale = self.orders.list_pending(since).await?;
        report.stale_orders_checked = stale.len();

        for order in stale {
            let session = match self
                .bounded(self.provider.retrieve_session(&order.session_id))
                .await
            {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(
                        order_id = %order.id,
                        session_id = %order.session_id,
                        error = %e,
                        "failed to look up session for stale pending order"
                    );
                    continue;
                }
            };

            match session.as_ref().and_then(ProviderSession::outcome) {
                Some(outcome) => self.settle(&order.session_id, outcome, &mut report).await?,
                None if session.is_none() => {
                    tracing::warn!(
                        order_id = %order.id,
                        session_id = %order.session_id,
                        "provider does not know the session of a pending order"
                    );
                }
                None => {}
            }
        }

        metrics::counter!("reconcile_runs_total").increment(1);
        Ok(report)
    }

    async fn settle(
        &self,
        session_id: &SessionId,
        outcome: PaymentOutcome,
        report: &mut ReconciliationReport,
    ) -> Result<(), PaymentError> {
        if let TransitionResult::Applied(order) = self
            .orders
            .apply_payment_outcome(session_id, outcome, self.policy)
            .await?
        {
            tracing::info!(
                order_id = %order.id,
                %session_id,
                status = %order.status,
                "order settled by reconciliation"
            );
            metrics::counter!("reconcile_settled_orders_total").increment(1);
            report.settled_orders.push(order.id);
        }
        Ok(())
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, PaymentError>>,
    ) -> Result<T, PaymentError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| PaymentError::Timeout(self.timeout))?
    }

    /// Spawns a task that runs a pass every `interval`.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match self.run_once().await {
                    Ok(report) => tracing::info!(
                        checked = report.sessions_checked,
                        stale = report.stale_orders_checked,
                        orphaned = report.orphaned_sessions.len(),
                        settled = report.settled_orders.len(),
                        "reconciliation pass complete"
                    ),
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            retryable = e.is_retryable(),
                            "reconciliation pass failed"
                        );
                        metrics::counter!("reconcile_failures_total").increment(1);
                    }
                }
            }
        })
    }
}
