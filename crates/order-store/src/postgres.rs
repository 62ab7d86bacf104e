use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BuyerId, OrderId, ProductId, SessionId};
use domain::{
    AssetKey, Money, NewOrder, Order, OrderStatus, PaymentOutcome, Product, TransitionPolicy,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderStoreError, Result,
    store::{OrderStore, ProductStore, TransitionResult},
};

const ORDER_COLUMNS: &str = "id, session_id, buyer_id, product_id, status, amount_cents, currency, product_title, version, created_at, updated_at";

/// PostgreSQL-backed order and product store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let status: OrderStatus = status
            .parse()
            .map_err(|e: domain::OrderError| OrderStoreError::CorruptRow(e.to_string()))?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            session_id: SessionId::new(row.try_get::<String, _>("session_id")?),
            buyer_id: BuyerId::new(row.try_get::<String, _>("buyer_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            status,
            amount: Money::from_cents(row.try_get("amount_cents")?),
            currency: row.try_get("currency")?,
            product_title: row.try_get("product_title")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            currency: row.try_get("currency")?,
            asset_key: AssetKey::new(row.try_get::<String, _>("asset_key")?),
        })
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn create_pending_order(&self, new: NewOrder) -> Result<Order> {
        let order = Order::pending(new, Utc::now());

        // The unique index on session_id makes this a find-or-create:
        // a losing concurrent insert returns no row and falls through to the select.
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO orders ({ORDER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (session_id) DO NOTHING
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.id.as_uuid())
        .bind(order.session_id.as_str())
        .bind(order.buyer_id.as_str())
        .bind(order.product_id.as_str())
        .bind(order.status.as_str())
        .bind(order.amount.cents())
        .bind(&order.currency)
        .bind(&order.product_title)
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Self::row_to_order(row);
        }

        tracing::debug!(session_id = %order.session_id, "order already exists for session");
        self.find_by_session(&order.session_id)
            .await?
            .ok_or(OrderStoreError::Conflict(order.session_id))
    }

    async fn apply_payment_outcome(
        &self,
        session_id: &SessionId,
        outcome: PaymentOutcome,
        policy: TransitionPolicy,
    ) -> Result<TransitionResult> {
        let guard = match policy {
            TransitionPolicy::ForwardOnly => "status = 'pending'",
            TransitionPolicy::LastWriteWins => "status <> $2",
        };

        let updated = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = $2, version = version + 1, updated_at = $3
            WHERE session_id = $1 AND {guard}
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(session_id.as_str())
        .bind(outcome.target_status().as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(TransitionResult::Applied(Self::row_to_order(row)?));
        }

        match self.find_by_session(session_id).await? {
            Some(order) => Ok(TransitionResult::Unchanged(order)),
            None => Ok(TransitionResult::NoMatchingOrder),
        }
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_by_session(&self, session_id: &SessionId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE session_id = $1"
        ))
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list_pending(&self, created_before: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at ASC
            "#
        ))
        .bind(created_before)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}

#[async_trait]
impl ProductStore for PostgresStore {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, description, price_cents, currency, asset_key
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }
}
