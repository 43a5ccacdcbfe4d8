//! # Domain Types
//!
//! Catalog, stock, and order types shared by the engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   StockEntry    │   │      Order      │   │   OrderLine     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  store_id  ┐    │   │  id (internal)  │   │  order_id (FK)  │       │
//! │  │  product_id┘UNQ │   │  receipt_id UUID│   │  product_id     │       │
//! │  │  quantity ≥ 0   │   │  total_amount   │   │  unit_price     │       │
//! │  │  threshold      │   │  status         │   │  quantity       │       │
//! │  │  is_active      │   │  payment_method │   │  subtotal       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRate      │   │  OrderStatus    │   │ PaymentMethod   │       │
//! │  │  bps (u32)      │   │  Pending / Paid │   │  Cash           │       │
//! │  │  1000 = 10%     │   │  Refunded/Failed│   │  Credit / Qr    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Orders have an internal integer `id` (joins, foreign keys) and a public
//! `receipt_id` (UUID v4). Anything reachable anonymously is keyed only by
//! the UUID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, ValidationError};
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1000 bps = 10% (the inclusive consumption tax)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A physical store.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Store {
    pub id: i64,
    pub name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A product available for sale. Price is tax-inclusive, in minor units.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub price: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_minor(self.price)
    }
}

// =============================================================================
// Stock Entry
// =============================================================================

/// Per-(store, product) quantity counter.
///
/// ## Invariant
/// `quantity` never goes negative. The database enforces it with a CHECK
/// constraint; the engine enforces it before every write so callers get a
/// typed error instead of a constraint failure.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockEntry {
    pub id: i64,
    pub store_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub low_stock_threshold: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StockEntry {
    /// Derived low-stock predicate: `quantity <= low_stock_threshold`.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.low_stock_threshold
    }

    /// Checks whether `requested` units can be sold from this entry.
    ///
    /// ## Check Order
    /// ```text
    /// is_active == false      → ProductUnavailable
    /// quantity  <  requested  → InsufficientStock
    /// otherwise               → Ok
    /// ```
    pub fn check_sellable(&self, requested: i64) -> Result<(), CoreError> {
        if !self.is_active {
            return Err(CoreError::ProductUnavailable {
                store_id: self.store_id,
                product_id: self.product_id,
            });
        }

        if self.quantity < requested {
            return Err(CoreError::InsufficientStock {
                product_id: self.product_id,
                available: self.quantity,
                requested,
            });
        }

        Ok(())
    }

    /// Computes the quantity after applying a signed delta.
    pub fn apply_delta(&self, delta: i64) -> Result<i64, CoreError> {
        let next = self.quantity.checked_add(delta).ok_or_else(|| ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: i64::MAX,
        })?;
        if next < 0 {
            return Err(CoreError::NegativeStock {
                product_id: self.product_id,
                current: self.quantity,
                delta,
            });
        }
        Ok(next)
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Lifecycle status of an order.
///
/// Settlement always creates orders as `Paid`: there is no separate
/// authorization step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Paid
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How the customer paid. Recorded as a label only; nothing is processed.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Credit,
    Qr,
}

impl PaymentMethod {
    /// Human-readable label for receipts.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Credit => "Credit card",
            PaymentMethod::Qr => "QR payment",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "credit" | "card" => Ok(PaymentMethod::Credit),
            "qr" => Ok(PaymentMethod::Qr),
            other => Err(ValidationError::InvalidFormat {
                field: "payment_method".to_string(),
                reason: format!("unknown method '{}', expected cash, credit or qr", other),
            }),
        }
    }
}

// =============================================================================
// Order
// =============================================================================

/// Immutable order header created at settlement time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: i64,
    /// Public lookup key (UUID v4).
    pub receipt_id: String,
    pub store_id: i64,
    /// `None` for walk-in sales.
    pub member_id: Option<i64>,
    /// `None` for self-service storefront orders.
    pub staff_id: Option<i64>,
    /// Tax-inclusive total in minor units.
    pub total_amount: i64,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub staff_code: Option<String>,
    pub coupon_code: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Returns the total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_minor(self.total_amount)
    }

    /// Stable receipt path, resolvable without authentication.
    pub fn receipt_path(&self) -> String {
        receipt_path(&self.receipt_id)
    }
}

/// Builds the public receipt path for a receipt UUID.
pub fn receipt_path(receipt_id: &str) -> String {
    format!("/receipts/{}", receipt_id)
}

// =============================================================================
// Order Line
// =============================================================================

/// A line of an order.
/// Uses snapshot pattern to freeze the product name at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,
    pub quantity: i64,
    /// Unit price at time of sale (frozen).
    pub unit_price: i64,
    /// unit_price × quantity.
    pub subtotal: i64,
}

// =============================================================================
// Receipt View
// =============================================================================

/// Anonymous receipt view. Contains no internal ids.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptView {
    pub receipt_id: String,
    pub store_name: String,
    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,
    pub lines: Vec<ReceiptLine>,
    pub total_amount: i64,
    pub tax_amount: i64,
    pub subtotal_amount: i64,
    pub payment_method: String,
    pub status: OrderStatus,
}

/// A line on the anonymous receipt.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLine {
    pub name: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub subtotal: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(quantity: i64, threshold: i64, is_active: bool) -> StockEntry {
        StockEntry {
            id: 1,
            store_id: 1,
            product_id: 42,
            quantity,
            low_stock_threshold: threshold,
            is_active,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(1000);
        assert_eq!(rate.bps(), 1000);
        assert!((rate.percentage() - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_low_stock_predicate() {
        assert!(entry(3, 3, true).is_low_stock());
        assert!(entry(0, 0, true).is_low_stock());
        assert!(!entry(4, 3, true).is_low_stock());
    }

    #[test]
    fn test_check_sellable() {
        assert!(entry(5, 0, true).check_sellable(5).is_ok());
        assert!(matches!(
            entry(5, 0, true).check_sellable(6),
            Err(CoreError::InsufficientStock { available: 5, requested: 6, .. })
        ));
        // Inactive wins over quantity
        assert!(matches!(
            entry(100, 0, false).check_sellable(1),
            Err(CoreError::ProductUnavailable { product_id: 42, .. })
        ));
    }

    #[test]
    fn test_apply_delta_never_negative() {
        assert_eq!(entry(5, 0, true).apply_delta(-5).unwrap(), 0);
        assert_eq!(entry(5, 0, true).apply_delta(10).unwrap(), 15);
        assert!(matches!(
            entry(5, 0, true).apply_delta(-6),
            Err(CoreError::NegativeStock { current: 5, delta: -6, .. })
        ));
    }

    #[test]
    fn test_apply_delta_overflow_is_rejected() {
        assert!(matches!(
            entry(5, 0, true).apply_delta(i64::MAX),
            Err(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
        assert!(matches!(
            entry(5, 0, true).apply_delta(i64::MIN),
            Err(CoreError::NegativeStock { current: 5, .. })
        ));
    }

    #[test]
    fn test_payment_method_parse_and_label() {
        assert_eq!("cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!(" QR ".parse::<PaymentMethod>().unwrap(), PaymentMethod::Qr);
        assert_eq!("card".parse::<PaymentMethod>().unwrap(), PaymentMethod::Credit);
        assert!("bitcoin".parse::<PaymentMethod>().is_err());
        assert_eq!(PaymentMethod::Credit.label(), "Credit card");
    }

    #[test]
    fn test_receipt_path() {
        assert_eq!(
            receipt_path("550e8400-e29b-41d4-a716-446655440000"),
            "/receipts/550e8400-e29b-41d4-a716-446655440000"
        );
    }
}
