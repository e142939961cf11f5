//! # Domain Types
//!
//! Core domain types used throughout Balcao POS.
//!
//! ## Type Hierarchy
//! ```text
//! +---------------------------------------------------------------------+
//! |                         Domain Types                                |
//! |                                                                     |
//! |  +---------------+   +----------------+   +---------------------+   |
//! |  |    Product    |   |      Sale      |   |     CashSession     |   |
//! |  |  -----------  |   |  ------------  |   |  -----------------  |   |
//! |  |  id (UUID)    |   |  id (UUID)     |   |  id (UUID)          |   |
//! |  |  sku          |   |  order_id (FK) |   |  operator_id        |   |
//! |  |  stock_on_hand|   |  total_cents   |   |  opening_balance    |   |
//! |  |  stock_minimum|   |  status        |   |  closing_balance    |   |
//! |  +---------------+   +----------------+   +----------+----------+   |
//! |                                                      | owns        |
//! |  +---------------+   +----------------+   +----------v----------+   |
//! |  |  SaleStatus   |   | PaymentMethod  |   |    CashMovement     |   |
//! |  |  -----------  |   |  ------------  |   |  -----------------  |   |
//! |  |  Finalized    |   |  Cash          |   |  kind (in/out)      |   |
//! |  |  Canceled     |   |  Card / Pix    |   |  amount_cents > 0   |   |
//! |  +---------------+   +----------------+   +---------------------+   |
//! +---------------------------------------------------------------------+
//! ```
//!
//! A `CashSession` exclusively owns its `CashMovement`s: movements are
//! append-only and cannot outlive or be reassigned to another session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
///
/// Stock is mutated only by the inventory ledger operations, never
/// directly; `stock_on_hand` never goes below zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name shown to the operator and snapshotted into order lines.
    pub name: String,

    /// Price in cents (smallest currency unit).
    pub unit_price_cents: i64,

    /// Current stock level. Never negative.
    pub stock_on_hand: i64,

    /// Threshold below which the product shows up in restock reports.
    pub stock_minimum: i64,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    /// When the product was created.
    pub created_at: DateTime<Utc>,

    /// When the product was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Checks if the product can cover the requested quantity.
    ///
    /// True iff the product is active and has `quantity` units on hand.
    /// This is the UI-level check; the settlement transaction re-validates
    /// at decrement time.
    pub fn can_sell(&self, quantity: i64) -> bool {
        self.is_active && self.stock_on_hand >= quantity
    }

    /// Checks if stock has fallen below the restock threshold.
    #[inline]
    pub fn below_minimum(&self) -> bool {
        self.stock_on_hand < self.stock_minimum
    }
}

// =============================================================================
// Sale
// =============================================================================

/// The status of a sale record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Sale has been settled and stock decremented.
    Finalized,
    /// Sale was canceled after settlement.
    Canceled,
}

/// How the customer paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on external terminal.
    Card,
    /// Instant bank transfer.
    Pix,
}

/// An immutable sale record, created when an order is finalized.
///
/// Totals are copied from the order at settlement time. After creation
/// the only permitted change is cancellation, which records the reason
/// and timestamp without touching the amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    /// Originating order (shared, read-only after finalize).
    pub order_id: String,
    pub total_cents: i64,
    pub discount_cents: i64,
    pub paid_cents: i64,
    pub change_cents: i64,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// Returns the sale total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Amount actually owed after discount.
    #[inline]
    pub fn net_due_cents(&self) -> i64 {
        self.total_cents - self.discount_cents
    }
}

// =============================================================================
// Payment Info
// =============================================================================

/// Payment details supplied by the operator when finalizing an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub method: PaymentMethod,
    /// Absolute discount in cents, 0 if none.
    pub discount_cents: i64,
    /// Amount the customer handed over.
    pub paid_cents: i64,
}

impl PaymentInfo {
    /// Creates payment info with no discount.
    pub fn exact(method: PaymentMethod, paid_cents: i64) -> Self {
        PaymentInfo {
            method,
            discount_cents: 0,
            paid_cents,
        }
    }

    /// Validates the amounts against the order total and returns the
    /// change due.
    ///
    /// ## Rules
    /// - discount must be within `[0, total]`
    /// - paid must cover `total - discount`
    ///
    /// ## Example
    /// ```rust
    /// use balcao_core::types::{PaymentInfo, PaymentMethod};
    ///
    /// let payment = PaymentInfo { method: PaymentMethod::Cash, discount_cents: 100, paid_cents: 1000 };
    /// assert_eq!(payment.change_for(900).unwrap(), 200);
    /// ```
    pub fn change_for(&self, total_cents: i64) -> CoreResult<i64> {
        if self.discount_cents < 0 || self.discount_cents > total_cents {
            return Err(CoreError::InvalidPayment {
                reason: format!(
                    "discount {} out of range for total {}",
                    self.discount_cents, total_cents
                ),
            });
        }

        let due = total_cents - self.discount_cents;
        if self.paid_cents < due {
            return Err(CoreError::InvalidPayment {
                reason: format!("paid {} does not cover amount due {}", self.paid_cents, due),
            });
        }

        Ok(self.paid_cents - due)
    }
}

// =============================================================================
// Cash Session
// =============================================================================

/// The lifecycle status of a cash session.
///
/// State machine: `NONE -> OPEN -> CLOSED` (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum CashSessionStatus {
    Open,
    Closed,
}

/// A cash drawer session ("caixa").
///
/// At most one session may be OPEN at any time. The closing balance is
/// set exactly once, at close, to the running balance at that moment,
/// and is immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashSession {
    pub id: String,
    pub operator_id: String,
    pub opening_balance_cents: i64,
    /// None while the session is open.
    pub closing_balance_cents: Option<i64>,
    pub status: CashSessionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub observation: Option<String>,
}

impl CashSession {
    /// Checks if the session is open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == CashSessionStatus::Open
    }

    /// Computes the balance given the session's movements.
    ///
    /// opening + sum(entradas) - sum(saidas)
    pub fn balance_with(&self, movements: &[CashMovement]) -> i64 {
        self.opening_balance_cents + movements.iter().map(|m| m.signed_cents()).sum::<i64>()
    }

    /// Returns the opening balance as Money.
    #[inline]
    pub fn opening_balance(&self) -> Money {
        Money::from_cents(self.opening_balance_cents)
    }
}

// =============================================================================
// Cash Movement
// =============================================================================

/// The direction of a cash movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Cash in (sale proceeds, reinforcement).
    Entrada,
    /// Cash out (withdrawal, expense).
    Saida,
}

/// A single append-only entry in a cash session's ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashMovement {
    pub id: String,
    pub cash_session_id: String,
    pub kind: MovementKind,
    /// Always positive; the kind carries the sign.
    pub amount_cents: i64,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

impl CashMovement {
    /// Returns the amount with the sign implied by the kind.
    #[inline]
    pub fn signed_cents(&self) -> i64 {
        match self.kind {
            MovementKind::Entrada => self.amount_cents,
            MovementKind::Saida => -self.amount_cents,
        }
    }

    /// Returns the amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
