//! # Order Aggregate
//!
//! The in-progress order being assembled at a terminal.
//!
//! ## Order Operations Flow
//! ```text
//! +---------------------------------------------------------------------+
//! |                    Order Aggregate Operations                       |
//! |                                                                     |
//! |  Operator Action          Aggregate Change                          |
//! |  ---------------          ----------------                          |
//! |  Scan product      -----> add_line() (merges same product/price)    |
//! |  Remove line       -----> remove_line(line_id)                      |
//! |  Start over        -----> clear() (back to empty OPEN order)        |
//! |  Finalize          -----> validate_for_finalize() then settlement   |
//! |                                                                     |
//! |  Exactly one order is "current" per terminal session at a time.     |
//! |  Once finalized the aggregate is immutable; the Sale record         |
//! |  references it read-only.                                           |
//! +---------------------------------------------------------------------+
//! ```
//!
//! `validate_for_finalize` is purely structural: it never touches stock.
//! Stock is re-checked inside the settlement transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::Product;
use crate::validation::validate_quantity;
use crate::MAX_ORDER_LINES;

// =============================================================================
// Order Status
// =============================================================================

/// The lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order is being assembled (lines can change).
    Open,
    /// Order was settled into a Sale.
    Finalized,
    /// Order was abandoned.
    Canceled,
}

impl OrderStatus {
    /// Lowercase label, matches the persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Finalized => "finalized",
            OrderStatus::Canceled => "canceled",
        }
    }
}

// =============================================================================
// Order Line
// =============================================================================

/// A line item in an order.
///
/// Uses the snapshot pattern: product name and unit price are frozen at
/// the time the line is added, so the order displays consistent data even
/// if the product record changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderLine {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// Product name at time of addition (frozen).
    pub product_name: String,
    /// Quantity ordered. Always > 0.
    pub quantity: i64,
    /// Unit price in cents at time of addition (frozen).
    pub unit_price_cents: i64,
    /// unit_price x quantity.
    pub line_total_cents: i64,
}

impl OrderLine {
    /// Creates a line snapshotting the product's name.
    fn from_product(order_id: &str, product: &Product, quantity: i64, unit_price_cents: i64) -> Self {
        OrderLine {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            quantity,
            unit_price_cents,
            line_total_cents: unit_price_cents * quantity,
        }
    }

    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns the line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Order
// =============================================================================

/// The order aggregate.
///
/// ## Invariants
/// - Lines are merged by `(product_id, unit_price)`; quantities add up
/// - Every line has quantity > 0
/// - Maximum lines: 100 (configured in this crate)
/// - Mutation is only allowed while the status is Open
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Resolved customer reference, if any.
    pub customer_id: Option<String>,
    /// Resolved seller/operator reference, if any.
    pub seller_id: Option<String>,
    pub status: OrderStatus,
    lines: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new empty open order.
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Order {
            id: id.into(),
            customer_id: None,
            seller_id: None,
            status: OrderStatus::Open,
            lines: Vec::new(),
            created_at,
        }
    }

    /// Rebuilds an aggregate from persisted parts.
    pub fn from_parts(
        id: String,
        customer_id: Option<String>,
        seller_id: Option<String>,
        status: OrderStatus,
        lines: Vec<OrderLine>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Order {
            id,
            customer_id,
            seller_id,
            status,
            lines,
            created_at,
        }
    }

    /// Adds a product to the order or increases quantity if a line with
    /// the same product and unit price already exists.
    pub fn add_line(
        &mut self,
        product: &Product,
        quantity: i64,
        unit_price_cents: i64,
    ) -> CoreResult<()> {
        self.ensure_open()?;
        validate_quantity(quantity)?;

        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product.id && l.unit_price_cents == unit_price_cents)
        {
            let new_qty = line.quantity + quantity;
            validate_quantity(new_qty)?;
            line.quantity = new_qty;
            line.line_total_cents = line.unit_price_cents * new_qty;
            return Ok(());
        }

        if self.lines.len() >= MAX_ORDER_LINES {
            return Err(CoreError::OrderTooLarge {
                max: MAX_ORDER_LINES,
            });
        }

        self.lines
            .push(OrderLine::from_product(&self.id, product, quantity, unit_price_cents));
        Ok(())
    }

    /// Removes a line by its id.
    pub fn remove_line(&mut self, line_id: &str) -> CoreResult<()> {
        self.ensure_open()?;

        let initial_len = self.lines.len();
        self.lines.retain(|l| l.id != line_id);

        if self.lines.len() == initial_len {
            return Err(CoreError::OrderLineNotFound {
                line_id: line_id.to_string(),
            });
        }
        Ok(())
    }

    /// Clears all lines, resetting to an empty open order.
    pub fn clear(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        self.lines.clear();
        Ok(())
    }

    /// Sets the resolved customer reference.
    pub fn set_customer(&mut self, customer_id: impl Into<String>) {
        self.customer_id = Some(customer_id.into());
    }

    /// Sets the resolved seller reference.
    pub fn set_seller(&mut self, seller_id: impl Into<String>) {
        self.seller_id = Some(seller_id.into());
    }

    /// Returns the lines in insertion order.
    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Returns the number of lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Returns the total quantity across all lines.
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Computes the order total (sum of line totals).
    pub fn total_cents(&self) -> i64 {
        self.lines.iter().map(|l| l.line_total_cents).sum()
    }

    /// Returns the total as Money.
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents())
    }

    /// Checks if the order has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Validates the order can be promoted to a Sale.
    ///
    /// Purely structural: at least one line, a resolved customer and a
    /// resolved seller. Stock is deliberately not consulted here; it is
    /// re-checked inside the settlement transaction.
    pub fn validate_for_finalize(&self) -> CoreResult<()> {
        self.ensure_open()?;

        if self.lines.is_empty() {
            return Err(CoreError::EmptyOrder);
        }
        if self.customer_id.is_none() {
            return Err(CoreError::MissingCustomer);
        }
        if self.seller_id.is_none() {
            return Err(CoreError::MissingSeller);
        }
        Ok(())
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.status != OrderStatus::Open {
            return Err(CoreError::InvalidOrderState {
                order_id: self.id.clone(),
                current: self.status.as_str().to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
