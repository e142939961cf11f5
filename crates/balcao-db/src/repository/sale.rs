//! # Sale Repository
//!
//! Persistence for immutable sale records.
//!
//! A sale row is written exactly once, by the settlement transaction.
//! The only later change is cancellation, which flips the status and
//! records reason/timestamp through a guarded UPDATE; amounts are never
//! touched again.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use balcao_core::{Sale, SaleStatus};

const SALE_COLUMNS: &str = "id, order_id, total_cents, discount_cents, paid_cents, change_cents, \
     payment_method, status, canceled_at, cancel_reason, created_at";

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

/// Inserts a sale row inside the caller's transaction.
pub(crate) async fn insert_sale(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    debug!(sale_id = %sale.id, order_id = %sale.order_id, total = %sale.total_cents, "Inserting sale");

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, order_id, total_cents, discount_cents, paid_cents, change_cents,
            payment_method, status, canceled_at, cancel_reason, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.order_id)
    .bind(sale.total_cents)
    .bind(sale.discount_cents)
    .bind(sale.paid_cents)
    .bind(sale.change_cents)
    .bind(sale.payment_method)
    .bind(sale.status)
    .bind(sale.canceled_at)
    .bind(&sale.cancel_reason)
    .bind(sale.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Loads a sale inside the caller's transaction.
pub(crate) async fn load_sale(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Sale> {
    let sale: Option<Sale> =
        sqlx::query_as(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"))
            .bind(sale_id)
            .fetch_optional(&mut *conn)
            .await?;

    sale.ok_or_else(|| DbError::not_found("Sale", sale_id))
}

/// Marks a finalized sale as canceled.
///
/// Guarded on `status = 'finalized'`: a second cancellation matches no
/// rows and the metadata recorded by the first one stays untouched.
/// Returns the number of rows changed (0 or 1).
pub(crate) async fn mark_canceled(
    conn: &mut SqliteConnection,
    sale_id: &str,
    reason: &str,
    canceled_at: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE sales SET
            status = 'canceled',
            canceled_at = ?2,
            cancel_reason = ?3
        WHERE id = ?1 AND status = 'finalized'
        "#,
    )
    .bind(sale_id)
    .bind(canceled_at)
    .bind(reason)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sale read access.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, sale_id: &str) -> DbResult<Option<Sale>> {
        let sale: Option<Sale> =
            sqlx::query_as(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"))
                .bind(sale_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(sale)
    }

    /// Gets the sales created from an order, newest first.
    ///
    /// An order can settle more than once if an earlier sale was
    /// canceled and the order reopened.
    pub async fn for_order(&self, order_id: &str) -> DbResult<Vec<Sale>> {
        let sales: Vec<Sale> = sqlx::query_as(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE order_id = ?1 ORDER BY created_at DESC"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Lists sales by status, newest first.
    pub async fn list_by_status(&self, status: SaleStatus, limit: u32) -> DbResult<Vec<Sale>> {
        let sales: Vec<Sale> = sqlx::query_as(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2"
        ))
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }
}
