//! # balcao-core: Pure Business Logic for Balcao POS
//!
//! This crate is the **heart** of the sale-settlement and cash-ledger
//! subsystem. It contains all business logic as pure functions with zero
//! I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! +--------------------------------------------------------------------+
//! |                      Balcao POS Architecture                       |
//! |                                                                    |
//! |  +--------------------------------------------------------------+  |
//! |  |          Screens / receipt and report rendering              |  |
//! |  |          (outside this workspace, read-only consumers)       |  |
//! |  +------------------------------+-------------------------------+  |
//! |                                 |                                  |
//! |  +------------------------------v-------------------------------+  |
//! |  |               * balcao-core (THIS CRATE) *                   |  |
//! |  |                                                              |  |
//! |  |  +--------+  +--------+  +--------+  +--------+  +--------+  |  |
//! |  |  | types  |  | money  |  | order  |  | valid. |  | error  |  |  |
//! |  |  | Sale   |  | Money  |  | Order  |  | rules  |  | kinds  |  |  |
//! |  |  | Caixa  |  | cents  |  | lines  |  | checks |  |        |  |  |
//! |  |  +--------+  +--------+  +--------+  +--------+  +--------+  |  |
//! |  |                                                              |  |
//! |  |  NO I/O - NO DATABASE - NO NETWORK - PURE FUNCTIONS          |  |
//! |  +------------------------------+-------------------------------+  |
//! |                                 |                                  |
//! |  +------------------------------v-------------------------------+  |
//! |  |                 balcao-db (Database Layer)                   |  |
//! |  |     SQLite ledgers, settlement transaction, reports          |  |
//! |  +--------------------------------------------------------------+  |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, CashSession, CashMovement)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`order`] - The order aggregate (lines, totals, structural checks)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64)
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod order;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use balcao_core::Money` instead of
// `use balcao_core::money::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use order::{Order, OrderLine, OrderStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single order
///
/// ## Business Reason
/// Prevents runaway orders and ensures reasonable transaction sizes.
pub const MAX_ORDER_LINES: usize = 100;

/// Maximum quantity of a single line
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Maximum single cash movement, in cents
///
/// ## Business Reason
/// A register movement above R$100,000.00 is a typo, not a sale.
pub const MAX_MOVEMENT_AMOUNT_CENTS: i64 = 10_000_000;
