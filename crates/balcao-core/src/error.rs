//! # Error Types
//!
//! Domain-specific error types for balcao-core.
//!
//! ## Error Hierarchy
//! ```text
//! +-----------------------------------------------------------------+
//! |                         Error Types                             |
//! |                                                                 |
//! |  balcao-core errors (this file)                                 |
//! |  +-- CoreError        - Business rule violations                |
//! |  +-- ValidationError  - Input validation failures               |
//! |                                                                 |
//! |  balcao-db errors (separate crate)                              |
//! |  +-- DbError          - Database operation failures             |
//! |                                                                 |
//! |  Flow: ValidationError -> CoreError -> DbError -> caller        |
//! +-----------------------------------------------------------------+
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product id, session id, etc.)
//! 3. Errors are enum variants, never String
//! 4. The settlement retry loop must be able to pattern-match error
//!    kinds, so nothing here depends on message text

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations detected either before
/// touching the store (order structure, payment amounts) or inside the
/// settlement transaction (stock, session state). They cause a full
/// rollback of the enclosing atomic unit.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Product exists but is inactive and cannot be sold.
    #[error("Product is inactive: {0}")]
    ProductInactive(String),

    /// Insufficient stock to settle a sale.
    ///
    /// ## When This Occurs
    /// - The availability check inside the settlement transaction finds
    ///   less stock than the order line requests
    /// - The decrement re-validation finds stock changed since the check
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Order has no lines and cannot be finalized.
    #[error("Order has no lines")]
    EmptyOrder,

    /// Order has no resolved customer.
    #[error("Order has no customer")]
    MissingCustomer,

    /// Order has no resolved seller.
    #[error("Order has no seller")]
    MissingSeller,

    /// Referenced order line does not exist on this order.
    #[error("Order line not found: {line_id}")]
    OrderLineNotFound { line_id: String },

    /// Order is not in a state that allows the requested operation.
    ///
    /// ## When This Occurs
    /// - Adding lines to a finalized order
    /// - Finalizing an order that is already finalized or canceled
    #[error("Order {order_id} is {current}, cannot perform operation")]
    InvalidOrderState { order_id: String, current: String },

    /// Sale is not in a state that allows the requested operation.
    ///
    /// ## When This Occurs
    /// - Canceling a sale that is already canceled
    #[error("Sale {sale_id} is {current}, cannot perform operation")]
    InvalidSaleState { sale_id: String, current: String },

    /// A cash session is already open.
    ///
    /// The ledger allows at most one OPEN session at any time; the check
    /// and the insert happen inside the same transaction.
    #[error("Cash session {session_id} is already open")]
    CashSessionAlreadyOpen { session_id: String },

    /// No cash session is open.
    ///
    /// Only raised when the settlement policy requires an open session
    /// for finalizing a sale.
    #[error("No cash session is open")]
    NoOpenCashSession,

    /// Cash session is not in a state that allows the requested operation.
    ///
    /// ## When This Occurs
    /// - Appending a movement to a closed session
    /// - Closing a session that is already closed
    #[error("Cash session {session_id} is {current}, cannot perform operation")]
    InvalidSessionState { session_id: String, current: String },

    /// A withdrawal would push the session balance below zero.
    #[error("Insufficient cash balance in session {session_id}: available {available}, requested {requested}")]
    InsufficientCashBalance {
        session_id: String,
        available: i64,
        requested: i64,
    },

    /// Payment amounts do not settle the order total.
    #[error("Invalid payment: {reason}")]
    InvalidPayment { reason: String },

    /// Order has grown past the maximum line count.
    #[error("Order cannot have more than {max} lines")]
    OrderTooLarge { max: usize },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when input doesn't meet requirements. They are
/// detected before any store access and never retried.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or positive.
    #[error("{field} must not be negative")]
    MustBeNonNegative { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product p-1: available 3, requested 5"
        );
    }

    #[test]
    fn test_session_error_messages() {
        let err = CoreError::CashSessionAlreadyOpen {
            session_id: "s-1".to_string(),
        };
        assert_eq!(err.to_string(), "Cash session s-1 is already open");

        let err = CoreError::InvalidSessionState {
            session_id: "s-1".to_string(),
            current: "closed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cash session s-1 is closed, cannot perform operation"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "amount".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
