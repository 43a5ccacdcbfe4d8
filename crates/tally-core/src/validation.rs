//! # Validation Module
//!
//! Input validation for engine operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request boundary                                             │
//! │  ├── Deserialization, actor resolution                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before any transaction opens)                   │
//! │  ├── Quantities, cart size, receipt UUIDs, free-text lengths           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0), CHECK (remaining_uses >= 0)                │
//! │  ├── UNIQUE (store_id, product_id)                                     │
//! │  └── Partial UNIQUE index: one open stocktake per store                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{MAX_CART_LINES, MAX_FREE_TEXT_LEN, MAX_LINE_QUANTITY, MAX_TICKET_USES, MAX_UNIT_PRICE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY (999)
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_quantity;
///
/// assert!(validate_quantity(5).is_ok());
/// assert!(validate_quantity(0).is_err());
/// assert!(validate_quantity(1000).is_err());
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a redemption quantity (1..=MAX_TICKET_USES).
pub fn validate_redeem_quantity(qty: i64) -> ValidationResult<()> {
    if qty < 1 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if qty > MAX_TICKET_USES {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_TICKET_USES,
        });
    }
    Ok(())
}

/// Validates the uses a ticket is issued with (1..=MAX_TICKET_USES).
pub fn validate_ticket_uses(uses: i64) -> ValidationResult<()> {
    if uses < 1 {
        return Err(ValidationError::MustBePositive {
            field: "uses".to_string(),
        });
    }
    if uses > MAX_TICKET_USES {
        return Err(ValidationError::OutOfRange {
            field: "uses".to_string(),
            min: 1,
            max: MAX_TICKET_USES,
        });
    }
    Ok(())
}

/// Validates a catalog unit price (0..=MAX_UNIT_PRICE).
pub fn validate_price(price: i64) -> ValidationResult<()> {
    if price < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }
    if price > MAX_UNIT_PRICE {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_UNIT_PRICE,
        });
    }
    Ok(())
}

/// Validates a physically counted quantity (≥ 0).
pub fn validate_counted_quantity(qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "actual_quantity".to_string(),
        });
    }
    Ok(())
}

/// Validates an absolute stock level (≥ 0).
pub fn validate_stock_level(qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates cart size (number of distinct lines).
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    if lines > MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "cart lines".to_string(),
            min: 1,
            max: MAX_CART_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a public receipt identifier and returns its stored form
/// (lowercase, hyphenated).
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_receipt_id;
///
/// assert_eq!(
///     validate_receipt_id("550E8400-E29B-41D4-A716-446655440000").unwrap(),
///     "550e8400-e29b-41d4-a716-446655440000"
/// );
/// assert!(validate_receipt_id("42").is_err());
/// ```
pub fn validate_receipt_id(id: &str) -> ValidationResult<String> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "receipt_id".to_string(),
        });
    }

    let parsed = uuid::Uuid::parse_str(id.trim()).map_err(|_| ValidationError::InvalidFormat {
        field: "receipt_id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(parsed.hyphenated().to_string())
}

/// Validates a scanned barcode: 1-32 ASCII digits or letters.
pub fn validate_barcode(barcode: &str) -> ValidationResult<String> {
    let barcode = barcode.trim();

    if barcode.is_empty() {
        return Err(ValidationError::Required {
            field: "barcode".to_string(),
        });
    }

    if barcode.len() > 32 {
        return Err(ValidationError::TooLong {
            field: "barcode".to_string(),
            max: 32,
        });
    }

    if !barcode.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must contain only letters and digits".to_string(),
        });
    }

    Ok(barcode.to_string())
}

/// Validates an optional free-text field (notes, staff code, coupon code).
///
/// Blank input collapses to `None`.
pub fn validate_free_text(field: &str, value: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(value) = value.map(str::trim) else {
        return Ok(None);
    };

    if value.is_empty() {
        return Ok(None);
    }

    if value.chars().count() > MAX_FREE_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_FREE_TEXT_LEN,
        });
    }

    Ok(Some(value.to_string()))
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
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_redeem_and_counted_quantity() {
        assert!(validate_redeem_quantity(1).is_ok());
        assert!(validate_redeem_quantity(0).is_err());
        assert!(validate_redeem_quantity(MAX_TICKET_USES).is_ok());
        assert!(validate_redeem_quantity(MAX_TICKET_USES + 1).is_err());

        assert!(validate_counted_quantity(0).is_ok());
        assert!(validate_counted_quantity(-3).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(0).is_err());
        assert!(validate_cart_size(1).is_ok());
        assert!(validate_cart_size(MAX_CART_LINES).is_ok());
        assert!(validate_cart_size(MAX_CART_LINES + 1).is_err());
    }

    #[test]
    fn test_validate_ticket_uses_and_price() {
        assert!(validate_ticket_uses(1).is_ok());
        assert!(validate_ticket_uses(MAX_TICKET_USES).is_ok());
        assert!(validate_ticket_uses(0).is_err());
        assert!(validate_ticket_uses(MAX_TICKET_USES + 1).is_err());
        assert!(validate_ticket_uses(i64::MAX).is_err());

        assert!(validate_price(0).is_ok());
        assert!(validate_price(MAX_UNIT_PRICE).is_ok());
        assert!(validate_price(-1).is_err());
        assert!(validate_price(MAX_UNIT_PRICE + 1).is_err());
    }

    #[test]
    fn test_validate_receipt_id() {
        let canonical = "550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(validate_receipt_id(canonical).unwrap(), canonical);
        assert_eq!(validate_receipt_id(" 550E8400-E29B-41D4-A716-446655440000 ").unwrap(), canonical);
        assert_eq!(validate_receipt_id("{550e8400-e29b-41d4-a716-446655440000}").unwrap(), canonical);
        assert_eq!(validate_receipt_id("urn:uuid:550e8400-e29b-41d4-a716-446655440000").unwrap(), canonical);
        assert_eq!(validate_receipt_id("550e8400e29b41d4a716446655440000").unwrap(), canonical);
        assert!(validate_receipt_id("").is_err());
        assert!(validate_receipt_id("1").is_err());
    }

    #[test]
    fn test_validate_barcode() {
        assert_eq!(validate_barcode(" 4901234567894 ").unwrap(), "4901234567894");
        assert!(validate_barcode("").is_err());
        assert!(validate_barcode("49-01").is_err());
        assert!(validate_barcode(&"1".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_free_text() {
        assert_eq!(validate_free_text("notes", None).unwrap(), None);
        assert_eq!(validate_free_text("notes", Some("   ")).unwrap(), None);
        assert_eq!(
            validate_free_text("coupon_code", Some(" SPRING ")).unwrap(),
            Some("SPRING".to_string())
        );
        assert!(validate_free_text("notes", Some(&"x".repeat(MAX_FREE_TEXT_LEN + 1))).is_err());
    }
}
