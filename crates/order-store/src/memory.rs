use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, SessionId};
use domain::{NewOrder, Order, PaymentOutcome, Product, TransitionPolicy};
use tokio::sync::RwLock;

use crate::{
    OrderStoreError, Result,
    store::{OrderStore, ProductStore, TransitionResult},
};

#[derive(Debug, Default)]
struct OrderTable {
    orders: HashMap<OrderId, Order>,
    by_session: HashMap<SessionId, OrderId>,
}

/// In-memory order store.
///
/// Each operation runs inside a single write-lock critical section, which
/// gives the same find-or-create and conditional-update guarantees as the
/// unique index and `WHERE status = 'pending'` clause of the SQL store.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    table: Arc<RwLock<OrderTable>>,
    fail_on_create: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `create_pending_order` call fail.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.fail_on_create.store(fail, Ordering::SeqCst);
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.table.read().await.orders.len()
    }

    /// Inserts a fully formed order, replacing any order with the same id.
    pub async fn insert(&self, order: Order) {
        let mut table = self.table.write().await;
        table.by_session.insert(order.session_id.clone(), order.id);
        table.orders.insert(order.id, order);
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_pending_order(&self, new: NewOrder) -> Result<Order> {
        if self.fail_on_create.load(Ordering::SeqCst) {
            return Err(OrderStoreError::Unavailable(
                "order writes disabled".to_string(),
            ));
        }

        let mut table = self.table.write().await;

        if let Some(existing) = table
            .by_session
            .get(&new.session_id)
            .and_then(|id| table.orders.get(id))
        {
            tracing::debug!(session_id = %new.session_id, order_id = %existing.id, "order already exists for session");
            return Ok(existing.clone());
        }

        let order = Order::pending(new, Utc::now());
        table.by_session.insert(order.session_id.clone(), order.id);
        table.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn apply_payment_outcome(
        &self,
        session_id: &SessionId,
        outcome: PaymentOutcome,
        policy: TransitionPolicy,
    ) -> Result<TransitionResult> {
        let mut table = self.table.write().await;

        let Some(order_id) = table.by_session.get(session_id).copied() else {
            return Ok(TransitionResult::NoMatchingOrder);
        };
        let Some(order) = table.orders.get_mut(&order_id) else {
            return Ok(TransitionResult::NoMatchingOrder);
        };

        if order.apply_outcome(outcome, policy, Utc::now()) {
            Ok(TransitionResult::Applied(order.clone()))
        } else {
            Ok(TransitionResult::Unchanged(order.clone()))
        }
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.table.read().await.orders.get(&order_id).cloned())
    }

    async fn find_by_session(&self, session_id: &SessionId) -> Result<Option<Order>> {
        let table = self.table.read().await;
        Ok(table
            .by_session
            .get(session_id)
            .and_then(|id| table.orders.get(id))
            .cloned())
    }

    async fn list_pending(&self, created_before: DateTime<Utc>) -> Result<Vec<Order>> {
        let table = self.table.read().await;
        let mut orders: Vec<_> = table
            .orders
            .values()
            .filter(|o| !o.status.is_terminal() && o.created_at < created_before)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

/// In-memory product catalog.
#[derive(Clone, Default)]
pub struct InMemoryProductStore {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a product.
    pub async fn upsert(&self, product: Product) {
        self.products
            .write()
            .await
            .insert(product.id.clone(), product);
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(product_id).cloned())
    }
}
