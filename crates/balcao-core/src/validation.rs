//! # Validation Module
//!
//! Input validation utilities for Balcao POS.
//!
//! Validation runs before business logic and before any store access, so
//! a bad quantity or amount never reaches the settlement transaction.
//! Database CHECK constraints are the last line of defense behind these.

use crate::error::ValidationError;
use crate::{MAX_LINE_QUANTITY, MAX_MOVEMENT_AMOUNT_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an order line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY (999)
///
/// ## Example
/// ```rust
/// use balcao_core::validation::validate_quantity;
///
/// assert!(validate_quantity(5).is_ok());
/// assert!(validate_quantity(0).is_err());
/// assert!(validate_quantity(1000).is_err());
/// ```
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if quantity > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a cash movement amount.
///
/// ## Rules
/// - Must be positive (> 0); the movement kind carries the sign
/// - Must not exceed MAX_MOVEMENT_AMOUNT_CENTS
pub fn validate_movement_amount(amount_cents: i64) -> ValidationResult<()> {
    if amount_cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    if amount_cents > MAX_MOVEMENT_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "amount".to_string(),
            min: 1,
            max: MAX_MOVEMENT_AMOUNT_CENTS,
        });
    }

    Ok(())
}

/// Validates an opening balance. Zero is allowed.
pub fn validate_opening_balance(amount_cents: i64) -> ValidationResult<()> {
    if amount_cents < 0 {
        return Err(ValidationError::MustBeNonNegative {
            field: "opening_balance".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a movement or cancellation description.
///
/// ## Rules
/// - Must not be empty
/// - Maximum 200 characters
pub fn validate_description(description: &str) -> ValidationResult<()> {
    let description = description.trim();

    if description.is_empty() {
        return Err(ValidationError::Required {
            field: "description".to_string(),
        });
    }

    if description.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "description".to_string(),
            max: 200,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-5).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_movement_amount() {
        assert!(validate_movement_amount(1).is_ok());
        assert!(validate_movement_amount(0).is_err());
        assert!(validate_movement_amount(-100).is_err());
    }

    #[test]
    fn test_validate_opening_balance_allows_zero() {
        assert!(validate_opening_balance(0).is_ok());
        assert!(validate_opening_balance(10_000).is_ok());
        assert!(validate_opening_balance(-1).is_err());
    }

    #[test]
    fn test_validate_description() {
        assert!(validate_description("sangria de caixa").is_ok());
        assert!(validate_description("").is_err());
        assert!(validate_description("   ").is_err());
        assert!(validate_description(&"x".repeat(201)).is_err());
    }
}
