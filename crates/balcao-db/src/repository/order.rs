//! # Order Repository
//!
//! Persistence for the order aggregate.
//!
//! ## Persistence Model
//! ```text
//! +---------------------------------------------------------------------+
//! |                                                                     |
//! |  balcao_core::Order (aggregate)          orders / order_lines       |
//! |  ------------------------------          ----------------------     |
//! |  create()                         -->    INSERT empty OPEN row      |
//! |  add_line()/remove_line()/clear() -->    (in memory only)           |
//! |  save()                           -->    UPDATE row, replace lines  |
//! |  get_by_id()                      -->    row + lines -> aggregate   |
//! |                                                                     |
//! |  Status transitions (open -> finalized -> open on cancel) happen    |
//! |  through guarded UPDATEs inside the settlement transaction, never   |
//! |  through save().                                                    |
//! |                                                                     |
//! +---------------------------------------------------------------------+
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use balcao_core::{CoreError, Order, OrderLine, OrderStatus};

const LINE_COLUMNS: &str =
    "id, order_id, product_id, product_name, quantity, unit_price_cents, line_total_cents";

/// Flat row shape of the orders table.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    customer_id: Option<String>,
    seller_id: Option<String>,
    status: OrderStatus,
    created_at: DateTime<Utc>,
}

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

/// Loads an order with its lines inside the caller's transaction.
pub(crate) async fn load_order(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Order> {
    let row: Option<OrderRow> = sqlx::query_as(
        "SELECT id, customer_id, seller_id, status, created_at FROM orders WHERE id = ?1",
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;

    let row = row.ok_or_else(|| DbError::not_found("Order", order_id))?;

    let lines: Vec<OrderLine> = sqlx::query_as(&format!(
        "SELECT {LINE_COLUMNS} FROM order_lines WHERE order_id = ?1 ORDER BY rowid"
    ))
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Order::from_parts(
        row.id,
        row.customer_id,
        row.seller_id,
        row.status,
        lines,
        row.created_at,
    ))
}

/// Transitions an order between statuses with a guarded UPDATE.
///
/// The guard makes the transition race-safe: if the stored status is not
/// `from`, nothing is written and the actual status is reported back.
pub(crate) async fn set_status(
    conn: &mut SqliteConnection,
    order_id: &str,
    from: OrderStatus,
    to: OrderStatus,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE orders SET status = ?3 WHERE id = ?1 AND status = ?2")
        .bind(order_id)
        .bind(from)
        .bind(to)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        let current: Option<(OrderStatus,)> =
            sqlx::query_as("SELECT status FROM orders WHERE id = ?1")
                .bind(order_id)
                .fetch_optional(&mut *conn)
                .await?;

        return match current {
            None => Err(DbError::not_found("Order", order_id)),
            Some((status,)) => Err(CoreError::InvalidOrderState {
                order_id: order_id.to_string(),
                current: status.as_str().to_string(),
            }
            .into()),
        };
    }

    debug!(order_id = %order_id, from = from.as_str(), to = to.as_str(), "Order status changed");
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order aggregate persistence.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Creates a new empty open order.
    pub async fn create(
        &self,
        customer_id: Option<&str>,
        seller_id: Option<&str>,
    ) -> DbResult<Order> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        debug!(order_id = %id, "Creating order");

        let mut order = Order::new(id, now);
        if let Some(customer_id) = customer_id {
            order.set_customer(customer_id);
        }
        if let Some(seller_id) = seller_id {
            order.set_seller(seller_id);
        }

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, seller_id, status, total_cents, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&order.id)
        .bind(&order.customer_id)
        .bind(&order.seller_id)
        .bind(order.status)
        .bind(order.total_cents())
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;

        Ok(order)
    }

    /// Persists the aggregate's current lines, references and total.
    ///
    /// Only open orders can be saved; lines are replaced wholesale so the
    /// stored set always mirrors the aggregate.
    pub async fn save(&self, order: &Order) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(OrderStatus,)> =
            sqlx::query_as("SELECT status FROM orders WHERE id = ?1")
                .bind(&order.id)
                .fetch_optional(&mut *tx)
                .await?;

        match current {
            None => return Err(DbError::not_found("Order", &order.id)),
            Some((OrderStatus::Open,)) => {}
            Some((status,)) => {
                return Err(CoreError::InvalidOrderState {
                    order_id: order.id.clone(),
                    current: status.as_str().to_string(),
                }
                .into())
            }
        }

        sqlx::query(
            "UPDATE orders SET customer_id = ?2, seller_id = ?3, total_cents = ?4 WHERE id = ?1",
        )
        .bind(&order.id)
        .bind(&order.customer_id)
        .bind(&order.seller_id)
        .bind(order.total_cents())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM order_lines WHERE order_id = ?1")
            .bind(&order.id)
            .execute(&mut *tx)
            .await?;

        for line in order.lines() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (
                    id, order_id, product_id, product_name,
                    quantity, unit_price_cents, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&line.id)
            .bind(&line.order_id)
            .bind(&line.product_id)
            .bind(&line.product_name)
            .bind(line.quantity)
            .bind(line.unit_price_cents)
            .bind(line.line_total_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(order_id = %order.id, lines = order.line_count(), total = order.total_cents(), "Order saved");
        Ok(())
    }

    /// Gets an order with its lines.
    pub async fn get_by_id(&self, order_id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        match load_order(&mut conn, order_id).await {
            Ok(order) => Ok(Some(order)),
            Err(DbError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::inventory::generate_product_id;
    use balcao_core::Product;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn insert_product(db: &Database, sku: &str, price: i64) -> Product {
        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            sku: sku.to_string(),
            name: format!("Product {}", sku),
            unit_price_cents: price,
            stock_on_hand: 50,
            stock_minimum: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.inventory().insert(&product).await.unwrap();
        product
    }

    #[tokio::test]
    async fn test_create_save_get_roundtrip() {
        let db = test_db().await;
        let repo = db.orders();
        let product = insert_product(&db, "CAFE-500", 1500).await;

        let mut order = repo.create(Some("c-1"), Some("op-1")).await.unwrap();
        order.add_line(&product, 3, product.unit_price_cents).unwrap();
        repo.save(&order).await.unwrap();

        let loaded = repo.get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::Open);
        assert_eq!(loaded.customer_id.as_deref(), Some("c-1"));
        assert_eq!(loaded.line_count(), 1);
        assert_eq!(loaded.total_cents(), 4500);
        assert_eq!(loaded.lines()[0].product_name, "Product CAFE-500");
    }

    #[tokio::test]
    async fn test_save_replaces_lines() {
        let db = test_db().await;
        let repo = db.orders();
        let product = insert_product(&db, "CAFE-500", 1500).await;

        let mut order = repo.create(None, None).await.unwrap();
        order.add_line(&product, 2, 1500).unwrap();
        repo.save(&order).await.unwrap();

        let line_id = order.lines()[0].id.clone();
        order.remove_line(&line_id).unwrap();
        order.add_line(&product, 5, 1400).unwrap();
        repo.save(&order).await.unwrap();

        let loaded = repo.get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(loaded.line_count(), 1);
        assert_eq!(loaded.total_cents(), 7000);
    }

    #[tokio::test]
    async fn test_get_missing_order() {
        let db = test_db().await;
        assert!(db.orders().get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_status_guard() {
        let db = test_db().await;
        let repo = db.orders();
        let order = repo.create(None, None).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        set_status(&mut conn, &order.id, OrderStatus::Open, OrderStatus::Finalized)
            .await
            .unwrap();

        // Wrong `from` status reports the actual state
        let err = set_status(&mut conn, &order.id, OrderStatus::Open, OrderStatus::Finalized)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InvalidOrderState { .. })
        ));

        let err = set_status(&mut conn, "missing", OrderStatus::Open, OrderStatus::Finalized)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_save_finalized_order_rejected() {
        let db = test_db().await;
        let repo = db.orders();
        let order = repo.create(None, None).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        set_status(&mut conn, &order.id, OrderStatus::Open, OrderStatus::Finalized)
            .await
            .unwrap();
        drop(conn);

        let err = repo.save(&order).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InvalidOrderState { .. })
        ));
    }
}
