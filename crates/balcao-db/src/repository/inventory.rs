//! # Inventory Ledger
//!
//! Owns product stock-on-hand. Exposes check-and-decrement and increment
//! operations plus the product accessors the rest of the system needs.
//!
//! ## The Check-Then-Act Race
//! ```text
//! +---------------------------------------------------------------------+
//! |                                                                     |
//! |  Operator builds order        Stock changes underneath              |
//! |  ---------------------        ------------------------              |
//! |  check: 5 on hand             another terminal sells 4              |
//! |  ...operator think-time...                                          |
//! |  finalize: decrement 5   -->  would go NEGATIVE                     |
//! |                                                                     |
//! |  CLOSED BY: decrement_stock re-reads the authoritative value        |
//! |  inside the same transaction that writes it, and fails with         |
//! |  InsufficientStock if the re-read comes up short.                   |
//! |                                                                     |
//! +---------------------------------------------------------------------+
//! ```
//!
//! The module-level functions run on a caller-supplied connection and
//! never begin or commit transactions themselves; the settlement
//! coordinator owns the atomic unit. The [`InventoryRepository`] methods
//! wrap them for standalone use (stock receiving, UI-level checks).

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::DbResult;
use balcao_core::{CoreError, Product, ValidationError};

const PRODUCT_COLUMNS: &str = "id, sku, name, unit_price_cents, stock_on_hand, stock_minimum, \
     is_active, created_at, updated_at";

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

/// Checks whether a product can cover the requested quantity.
///
/// True iff the product exists, is active, and has at least `quantity`
/// units on hand. A missing product reads as unavailable.
pub async fn check_availability(
    conn: &mut SqliteConnection,
    product_id: &str,
    quantity: i64,
) -> DbResult<bool> {
    let row: Option<(i64, bool)> =
        sqlx::query_as("SELECT stock_on_hand, is_active FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(matches!(row, Some((stock, true)) if stock >= quantity))
}

/// Ensures a product can cover the requested quantity, with a typed
/// error naming the product when it cannot.
pub async fn ensure_available(
    conn: &mut SqliteConnection,
    product_id: &str,
    quantity: i64,
) -> DbResult<()> {
    let row: Option<(i64, bool)> =
        sqlx::query_as("SELECT stock_on_hand, is_active FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;

    let (stock, active) = match row {
        Some(row) => row,
        None => return Err(CoreError::ProductNotFound(product_id.to_string()).into()),
    };

    if !active {
        return Err(CoreError::ProductInactive(product_id.to_string()).into());
    }

    if stock < quantity {
        return Err(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            available: stock,
            requested: quantity,
        }
        .into());
    }

    Ok(())
}

/// Decrements stock inside the caller's transaction.
///
/// Re-reads the current stock before writing: the availability check at
/// order-build time may be stale by the time the settlement commits.
pub async fn decrement_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    quantity: i64,
) -> DbResult<()> {
    ensure_available(&mut *conn, product_id, quantity).await?;

    let now = Utc::now();
    sqlx::query(
        "UPDATE products SET stock_on_hand = stock_on_hand - ?2, updated_at = ?3 WHERE id = ?1",
    )
    .bind(product_id)
    .bind(quantity)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    debug!(product_id = %product_id, quantity = %quantity, "Stock decremented");
    Ok(())
}

/// Increments stock inside the caller's transaction (receiving).
///
/// No upper bound check; quantity must be positive.
pub async fn increment_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    quantity: i64,
) -> DbResult<()> {
    if quantity <= 0 {
        return Err(CoreError::from(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        })
        .into());
    }

    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE products SET stock_on_hand = stock_on_hand + ?2, updated_at = ?3 WHERE id = ?1",
    )
    .bind(product_id)
    .bind(quantity)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::ProductNotFound(product_id.to_string()).into());
    }

    debug!(product_id = %product_id, quantity = %quantity, "Stock incremented");
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product and stock operations.
///
/// ## Usage
/// ```rust,ignore
/// let inventory = db.inventory();
/// inventory.receive_stock("product-id", 24).await?;
/// let low = inventory.below_minimum().await?;
/// ```
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Inserts a new product.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, unit_price_cents,
                stock_on_hand, stock_minimum, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.unit_price_cents)
        .bind(product.stock_on_hand)
        .bind(product.stock_minimum)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by its SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1"
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// UI-level availability check (outside any settlement transaction).
    ///
    /// The result may be stale by commit time; the settlement re-checks.
    pub async fn check_availability(&self, product_id: &str, quantity: i64) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        check_availability(&mut conn, product_id, quantity).await
    }

    /// Receives stock (goods-in) in its own transaction.
    pub async fn receive_stock(&self, product_id: &str, quantity: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        increment_stock(&mut tx, product_id, quantity).await?;
        tx.commit().await?;

        info!(product_id = %product_id, quantity = %quantity, "Stock received");
        Ok(())
    }

    /// Lists active products whose stock fell below their minimum.
    pub async fn below_minimum(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_active = 1 AND stock_on_hand < stock_minimum \
             ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
