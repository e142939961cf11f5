//! # Sale Settlement Coordinator
//!
//! Turns an open order into a finalized sale as one atomic unit, and
//! cancels sales.
//!
//! ## The Settlement Transaction
//! ```text
//! +---------------------------------------------------------------------+
//! |                  finalize_order (one transaction)                   |
//! |                                                                     |
//! |  1. Load order + lines, validate structure (never touches stock)    |
//! |  2. Validate payment amounts, compute change                        |
//! |  3. Availability check per line  -> InsufficientStock aborts all    |
//! |  4. Decrement stock per line     -> re-validates at write time      |
//! |  5. Insert Sale, order OPEN -> FINALIZED                            |
//! |  6. Open cash session? append CashMovement(entrada, total)          |
//! |  7. COMMIT                                                          |
//! |                                                                     |
//! |  Steps 3-6 are all-or-nothing: a sale can never exist without its   |
//! |  stock decrement, and vice versa.                                   |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Retry
//! If the store reports lock contention (surfaced as `DbError::Busy`),
//! the WHOLE sequence is retried, up to `max_attempts`, sleeping
//! `attempt x retry_base_delay` between attempts. Any other failure
//! rolls back and propagates immediately; exhaustion surfaces
//! `DbError::RetriesExhausted`.

use sqlx::SqlitePool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{cash, inventory, order, sale};
use balcao_core::validation::validate_description;
use balcao_core::{
    CoreError, MovementKind, OrderStatus, PaymentInfo, Sale, SaleStatus,
};
use chrono::Utc;

// =============================================================================
// Configuration
// =============================================================================

/// Settlement coordinator configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = SettlementConfig::default()
///     .max_attempts(5)
///     .require_open_session(true);
/// ```
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Maximum attempts for a contended settlement.
    /// Default: 3
    pub max_attempts: u32,

    /// Base delay between attempts; attempt N sleeps N x this.
    /// Default: 50ms
    pub retry_base_delay: Duration,

    /// Whether finalizing a sale requires an open cash session.
    ///
    /// Off by default: the sale still finalizes and cash tracking is
    /// best-effort. Stores that reconcile every sale against the drawer
    /// turn this on.
    pub require_open_session: bool,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        SettlementConfig {
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(50),
            require_open_session: false,
        }
    }
}

impl SettlementConfig {
    /// Sets the maximum attempt count. Clamped to at least 1.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base retry delay.
    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Sets whether an open cash session is required to finalize.
    pub fn require_open_session(mut self, required: bool) -> Self {
        self.require_open_session = required;
        self
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// The sale settlement coordinator.
#[derive(Debug, Clone)]
pub struct Settlement {
    pool: SqlitePool,
    config: SettlementConfig,
}

impl Settlement {
    /// Creates a new settlement coordinator.
    pub fn new(pool: SqlitePool, config: SettlementConfig) -> Self {
        Settlement { pool, config }
    }

    /// Finalizes an open order into a Sale.
    ///
    /// Runs the settlement transaction, retrying the whole unit on lock
    /// contention. On success the sale, the stock decrements, the order
    /// transition and (if a session is open) the cash movement are all
    /// visible; on failure none of them are.
    pub async fn finalize_order(&self, order_id: &str, payment: &PaymentInfo) -> DbResult<Sale> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.try_finalize(order_id, payment).await {
                Ok(sale) => {
                    info!(
                        sale_id = %sale.id,
                        order_id = %order_id,
                        total = %sale.total_cents,
                        attempt = attempt,
                        "Sale finalized"
                    );
                    return Ok(sale);
                }
                Err(err) if err.is_contention() => {
                    if attempt >= self.config.max_attempts {
                        warn!(
                            order_id = %order_id,
                            attempts = attempt,
                            "Settlement retries exhausted"
                        );
                        return Err(DbError::RetriesExhausted { attempts: attempt });
                    }

                    let delay = self.config.retry_base_delay * attempt;
                    warn!(
                        order_id = %order_id,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Settlement contended, retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One settlement attempt: the whole sequence in one transaction.
    async fn try_finalize(&self, order_id: &str, payment: &PaymentInfo) -> DbResult<Sale> {
        let mut tx = self.pool.begin().await?;

        // 1. Structural validation; stock is deliberately not consulted
        let order = order::load_order(&mut tx, order_id).await?;
        order.validate_for_finalize()?;

        // 2. Payment amounts
        let total_cents = order.total_cents();
        let change_cents = payment.change_for(total_cents)?;

        // 3. Availability check for every line; the first failure aborts
        //    the whole attempt with no decrement written
        for line in order.lines() {
            inventory::ensure_available(&mut tx, &line.product_id, line.quantity).await?;
        }

        // 4. Decrement, re-validating at write time
        for line in order.lines() {
            inventory::decrement_stock(&mut tx, &line.product_id, line.quantity).await?;
        }

        // 5. Sale record + order transition
        let now = Utc::now();
        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            total_cents,
            discount_cents: payment.discount_cents,
            paid_cents: payment.paid_cents,
            change_cents,
            payment_method: payment.method,
            status: SaleStatus::Finalized,
            canceled_at: None,
            cancel_reason: None,
            created_at: now,
        };
        sale::insert_sale(&mut tx, &sale).await?;
        order::set_status(&mut tx, order_id, OrderStatus::Open, OrderStatus::Finalized).await?;

        // 6. Route proceeds to the open cash session, if any
        match cash::find_open(&mut tx).await? {
            Some(session) => {
                cash::append_movement(
                    &mut tx,
                    &session.id,
                    MovementKind::Entrada,
                    total_cents,
                    &format!("sale {}", sale.id),
                )
                .await?;
            }
            None if self.config.require_open_session => {
                return Err(CoreError::NoOpenCashSession.into());
            }
            None => {
                debug!(order_id = %order_id, "No open cash session, sale proceeds untracked");
            }
        }

        // 7. All-or-nothing
        tx.commit().await?;
        Ok(sale)
    }

    /// Cancels a finalized sale.
    ///
    /// Records the reason and timestamp, restores the originating order
    /// to OPEN, all in one transaction. A second cancellation fails with
    /// `InvalidSaleState` and leaves the first cancellation's metadata
    /// untouched. Stock is not restored; returned goods re-enter through
    /// the receiving operation.
    pub async fn cancel_sale(&self, sale_id: &str, reason: &str) -> DbResult<Sale> {
        validate_description(reason).map_err(CoreError::from)?;

        let mut tx = self.pool.begin().await?;

        let existing = sale::load_sale(&mut tx, sale_id).await?;
        if existing.status == SaleStatus::Canceled {
            return Err(CoreError::InvalidSaleState {
                sale_id: sale_id.to_string(),
                current: "canceled".to_string(),
            }
            .into());
        }

        let canceled_at = Utc::now();
        let changed = sale::mark_canceled(&mut tx, sale_id, reason, canceled_at).await?;
        if changed == 0 {
            // Lost a race with another cancellation inside this window
            return Err(CoreError::InvalidSaleState {
                sale_id: sale_id.to_string(),
                current: "canceled".to_string(),
            }
            .into());
        }

        order::set_status(
            &mut tx,
            &existing.order_id,
            OrderStatus::Finalized,
            OrderStatus::Open,
        )
        .await?;

        tx.commit().await?;

        info!(sale_id = %sale_id, order_id = %existing.order_id, "Sale canceled");

        let mut sale = existing;
        sale.status = SaleStatus::Canceled;
        sale.canceled_at = Some(canceled_at);
        sale.cancel_reason = Some(reason.to_string());
        Ok(sale)
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
    use balcao_core::{Order, PaymentMethod, Product, ValidationError};

    async fn test_db() -> Database {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("warn")
            .try_init();
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn insert_product(db: &Database, sku: &str, price: i64, stock: i64) -> Product {
        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            sku: sku.to_string(),
            name: format!("Product {}", sku),
            unit_price_cents: price,
            stock_on_hand: stock,
            stock_minimum: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.inventory().insert(&product).await.unwrap();
        product
    }

    /// Creates a saved open order with one line of `quantity` units.
    async fn order_for(db: &Database, product: &Product, quantity: i64) -> Order {
        let mut order = db
            .orders()
            .create(Some("c-1"), Some("op-1"))
            .await
            .unwrap();
        order
            .add_line(product, quantity, product.unit_price_cents)
            .unwrap();
        db.orders().save(&order).await.unwrap();
        order
    }

    fn cash_exact(paid_cents: i64) -> PaymentInfo {
        PaymentInfo::exact(PaymentMethod::Cash, paid_cents)
    }

    #[tokio::test]
    async fn test_finalize_decrements_stock_and_records_sale() {
        let db = test_db().await;
        let settlement = db.settlement(SettlementConfig::default());

        // Product with stock 5, order for exactly 5
        let product = insert_product(&db, "CAFE-500", 1_000, 5).await;
        let order = order_for(&db, &product, 5).await;
        let session = db.cash().open("op-1", 0).await.unwrap();

        let sale = settlement
            .finalize_order(&order.id, &cash_exact(5_000))
            .await
            .unwrap();

        assert_eq!(sale.status, SaleStatus::Finalized);
        assert_eq!(sale.total_cents, 5_000);
        assert_eq!(sale.change_cents, 0);

        // Stock drained to zero
        let stock = db.inventory().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stock.stock_on_hand, 0);

        // Order finalized
        let stored_order = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored_order.status, OrderStatus::Finalized);

        // Sale persisted
        let stored_sale = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(stored_sale.total_cents, 5_000);

        // Proceeds routed to the open session
        let movements = db.cash().movements(&session.id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].kind, MovementKind::Entrada);
        assert_eq!(movements[0].amount_cents, 5_000);
        assert_eq!(movements[0].description, format!("sale {}", sale.id));
    }

    #[tokio::test]
    async fn test_insufficient_stock_aborts_everything() {
        let db = test_db().await;
        let settlement = db.settlement(SettlementConfig::default());

        // Product with stock 2, order for 3
        let product = insert_product(&db, "CAFE-500", 1_000, 2).await;
        let order = order_for(&db, &product, 3).await;

        let err = settlement
            .finalize_order(&order.id, &cash_exact(3_000))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InsufficientStock { .. })
        ));

        // Nothing changed: stock intact, order still open, no sale row
        let stock = db.inventory().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stock.stock_on_hand, 2);

        let stored_order = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored_order.status, OrderStatus::Open);

        assert!(db.sales().for_order(&order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_stock_failure_rolls_back_all_lines() {
        let db = test_db().await;
        let settlement = db.settlement(SettlementConfig::default());

        let plenty = insert_product(&db, "OK-1", 500, 50).await;
        let scarce = insert_product(&db, "LOW-1", 800, 1).await;

        let mut order = db.orders().create(Some("c-1"), Some("op-1")).await.unwrap();
        order.add_line(&plenty, 10, 500).unwrap();
        order.add_line(&scarce, 2, 800).unwrap();
        db.orders().save(&order).await.unwrap();

        let err = settlement
            .finalize_order(&order.id, &cash_exact(10_000))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InsufficientStock { .. })
        ));

        // The line that would have succeeded was not decremented either
        let p = db.inventory().get_by_id(&plenty.id).await.unwrap().unwrap();
        assert_eq!(p.stock_on_hand, 50);
        let s = db.inventory().get_by_id(&scarce.id).await.unwrap().unwrap();
        assert_eq!(s.stock_on_hand, 1);
    }

    #[tokio::test]
    async fn test_finalize_without_session_by_default() {
        let db = test_db().await;
        let settlement = db.settlement(SettlementConfig::default());

        let product = insert_product(&db, "CAFE-500", 1_000, 5).await;
        let order = order_for(&db, &product, 2).await;

        // No session open: sale still settles, nothing tracked
        let sale = settlement
            .finalize_order(&order.id, &cash_exact(2_000))
            .await
            .unwrap();
        assert_eq!(sale.status, SaleStatus::Finalized);
    }

    #[tokio::test]
    async fn test_require_open_session_policy() {
        let db = test_db().await;
        let settlement =
            db.settlement(SettlementConfig::default().require_open_session(true));

        let product = insert_product(&db, "CAFE-500", 1_000, 5).await;
        let order = order_for(&db, &product, 2).await;

        let err = settlement
            .finalize_order(&order.id, &cash_exact(2_000))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::NoOpenCashSession)));

        // The abort rolled back the stock decrement too
        let stock = db.inventory().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stock.stock_on_hand, 5);
        let stored_order = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored_order.status, OrderStatus::Open);
    }

    #[tokio::test]
    async fn test_discount_and_change() {
        let db = test_db().await;
        let settlement = db.settlement(SettlementConfig::default());

        let product = insert_product(&db, "CAFE-500", 1_000, 5).await;
        let order = order_for(&db, &product, 3).await; // total 3000

        let payment = PaymentInfo {
            method: PaymentMethod::Cash,
            discount_cents: 500,
            paid_cents: 3_000,
        };
        let sale = settlement.finalize_order(&order.id, &payment).await.unwrap();

        assert_eq!(sale.total_cents, 3_000);
        assert_eq!(sale.discount_cents, 500);
        assert_eq!(sale.change_cents, 500); // 3000 - (3000 - 500)
    }

    #[tokio::test]
    async fn test_underpayment_rejected_before_any_write() {
        let db = test_db().await;
        let settlement = db.settlement(SettlementConfig::default());

        let product = insert_product(&db, "CAFE-500", 1_000, 5).await;
        let order = order_for(&db, &product, 3).await;

        let err = settlement
            .finalize_order(&order.id, &cash_exact(2_000))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InvalidPayment { .. })));

        let stock = db.inventory().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stock.stock_on_hand, 5);
    }

    #[tokio::test]
    async fn test_structural_validation_errors() {
        let db = test_db().await;
        let settlement = db.settlement(SettlementConfig::default());
        let product = insert_product(&db, "CAFE-500", 1_000, 5).await;

        // Empty order
        let empty = db.orders().create(Some("c-1"), Some("op-1")).await.unwrap();
        let err = settlement
            .finalize_order(&empty.id, &cash_exact(0))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::EmptyOrder)));

        // No customer
        let mut no_customer = db.orders().create(None, Some("op-1")).await.unwrap();
        no_customer.add_line(&product, 1, 1_000).unwrap();
        db.orders().save(&no_customer).await.unwrap();
        let err = settlement
            .finalize_order(&no_customer.id, &cash_exact(1_000))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::MissingCustomer)));

        // No seller
        let mut no_seller = db.orders().create(Some("c-1"), None).await.unwrap();
        no_seller.add_line(&product, 1, 1_000).unwrap();
        db.orders().save(&no_seller).await.unwrap();
        let err = settlement
            .finalize_order(&no_seller.id, &cash_exact(1_000))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::MissingSeller)));

        // Missing order altogether
        let err = settlement
            .finalize_order("missing", &cash_exact(0))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_finalize_twice_rejected() {
        let db = test_db().await;
        let settlement = db.settlement(SettlementConfig::default());

        let product = insert_product(&db, "CAFE-500", 1_000, 10).await;
        let order = order_for(&db, &product, 2).await;

        settlement
            .finalize_order(&order.id, &cash_exact(2_000))
            .await
            .unwrap();

        let err = settlement
            .finalize_order(&order.id, &cash_exact(2_000))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InvalidOrderState { .. })
        ));

        // Only the first settlement decremented
        let stock = db.inventory().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stock.stock_on_hand, 8);
    }

    #[tokio::test]
    async fn test_cancel_sale() {
        let db = test_db().await;
        let settlement = db.settlement(SettlementConfig::default());

        let product = insert_product(&db, "CAFE-500", 1_000, 5).await;
        let order = order_for(&db, &product, 2).await;
        let sale = settlement
            .finalize_order(&order.id, &cash_exact(2_000))
            .await
            .unwrap();

        let canceled = settlement
            .cancel_sale(&sale.id, "cliente desistiu")
            .await
            .unwrap();
        assert_eq!(canceled.status, SaleStatus::Canceled);
        assert_eq!(canceled.cancel_reason.as_deref(), Some("cliente desistiu"));
        assert!(canceled.canceled_at.is_some());

        // Order reopened
        let stored_order = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored_order.status, OrderStatus::Open);

        // Stock stays decremented (returns go through receiving)
        let stock = db.inventory().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stock.stock_on_hand, 3);
    }

    #[tokio::test]
    async fn test_cancel_twice_preserves_metadata() {
        let db = test_db().await;
        let settlement = db.settlement(SettlementConfig::default());

        let product = insert_product(&db, "CAFE-500", 1_000, 5).await;
        let order = order_for(&db, &product, 2).await;
        let sale = settlement
            .finalize_order(&order.id, &cash_exact(2_000))
            .await
            .unwrap();

        let first = settlement.cancel_sale(&sale.id, "motivo um").await.unwrap();

        let err = settlement
            .cancel_sale(&sale.id, "motivo dois")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InvalidSaleState { .. })
        ));

        // First cancellation's metadata unchanged by the failed attempt
        let stored = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(stored.cancel_reason.as_deref(), Some("motivo um"));
        assert_eq!(stored.canceled_at, first.canceled_at);
    }

    #[tokio::test]
    async fn test_cancel_requires_reason() {
        let db = test_db().await;
        let settlement = db.settlement(SettlementConfig::default());

        let err = settlement.cancel_sale("whatever", "  ").await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::Validation(ValidationError::Required { .. }))
        ));
    }

    #[tokio::test]
    async fn test_cancel_missing_sale() {
        let db = test_db().await;
        let settlement = db.settlement(SettlementConfig::default());

        let err = settlement
            .cancel_sale("missing", "qualquer motivo")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_reopened_order_can_settle_again() {
        let db = test_db().await;
        let settlement = db.settlement(SettlementConfig::default());

        let product = insert_product(&db, "CAFE-500", 1_000, 10).await;
        let order = order_for(&db, &product, 2).await;

        let first = settlement
            .finalize_order(&order.id, &cash_exact(2_000))
            .await
            .unwrap();
        settlement.cancel_sale(&first.id, "troca").await.unwrap();

        let second = settlement
            .finalize_order(&order.id, &cash_exact(2_000))
            .await
            .unwrap();
        assert_ne!(second.id, first.id);

        let sales = db.sales().for_order(&order.id).await.unwrap();
        assert_eq!(sales.len(), 2);
    }

    #[test]
    fn test_config_builder() {
        let config = SettlementConfig::default()
            .max_attempts(5)
            .retry_base_delay(Duration::from_millis(10))
            .require_open_session(true);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.retry_base_delay, Duration::from_millis(10));
        assert!(config.require_open_session);

        // Zero attempts makes no sense; clamped up
        assert_eq!(SettlementConfig::default().max_attempts(0).max_attempts, 1);
    }
}
