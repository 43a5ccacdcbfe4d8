//! # Settlement Rules
//!
//! The pure half of sale settlement: cart normalization, party resolution,
//! and totals. The database half (locking, decrementing, inserting) lives in
//! `tally-db`.
//!
//! ## Settlement Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SettlementRequest (store, lines, payment, member?, codes?)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  normalize_cart()      ← THIS MODULE                                    │
//! │       │  merge duplicate products, validate quantities,                 │
//! │       │  sort by product id (canonical lock order)                      │
//! │       ▼                                                                 │
//! │  SettlementParties::resolve(actor)   ← THIS MODULE                      │
//! │       │  who is the staff, who is the member                            │
//! │       ▼                                                                 │
//! │  tally-db: BEGIN IMMEDIATE → lock rows → check → insert → decrement     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  settlement_totals()   ← THIS MODULE                                    │
//! │          Σ unit_price × qty, reject zero, split inclusive tax           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::actor::{Actor, ActorKind};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, TaxSplit};
use crate::types::{PaymentMethod, TaxRate};
use crate::validation::{validate_cart_size, validate_free_text, validate_quantity};
use crate::MAX_LINE_QUANTITY;

// =============================================================================
// Request Types
// =============================================================================

/// One requested cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i64,
}

impl CartLine {
    pub const fn new(product_id: i64, quantity: i64) -> Self {
        CartLine {
            product_id,
            quantity,
        }
    }
}

/// Input to `settle_sale`, identical for staff terminals and the storefront.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SettlementRequest {
    pub store_id: i64,
    pub lines: Vec<CartLine>,
    pub payment_method: PaymentMethod,
    /// Member attached at the terminal (loyalty card). Ignored for member
    /// actors, who are always the member of their own order.
    pub member_id: Option<i64>,
    pub staff_code: Option<String>,
    pub coupon_code: Option<String>,
}

// =============================================================================
// Cart Normalization
// =============================================================================

/// Merges duplicate products and returns lines in ascending product id order.
///
/// ## Why Sorted?
/// ```text
/// Cart A: [apple, bread]        Cart B: [bread, apple]
///   lock apple ──┐                lock bread ──┐
///   lock bread ◄─┼── waits ──►    lock apple   │  DEADLOCK
///
/// Sorted: both carts lock apple first, then bread. No cycle is possible.
/// ```
///
/// ## Errors
/// - Empty cart, too many lines, quantity out of range → `Validation` /
///   `QuantityTooLarge`
pub fn normalize_cart(lines: &[CartLine]) -> CoreResult<Vec<CartLine>> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        }
        .into());
    }

    let mut merged: BTreeMap<i64, i64> = BTreeMap::new();
    for line in lines {
        validate_quantity(line.quantity)?;
        *merged.entry(line.product_id).or_insert(0) += line.quantity;
    }

    validate_cart_size(merged.len()).map_err(|_| CoreError::CartTooLarge {
        max: crate::MAX_CART_LINES,
    })?;

    merged
        .into_iter()
        .map(|(product_id, quantity)| {
            if quantity > MAX_LINE_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: quantity,
                    max: MAX_LINE_QUANTITY,
                });
            }
            Ok(CartLine::new(product_id, quantity))
        })
        .collect()
}

// =============================================================================
// Parties
// =============================================================================

/// Who an order is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementParties {
    pub member_id: Option<i64>,
    pub staff_id: Option<i64>,
}

impl SettlementParties {
    /// Resolves member/staff attribution from the actor.
    ///
    /// ## Rules
    /// ```text
    /// Staff/Admin  → staff_id = actor.id, member_id = request.member_id
    ///                (staff must belong to the store)
    /// Member       → staff_id = None,     member_id = actor.id
    ///                (request.member_id must be absent or the same member)
    /// ```
    pub fn resolve(actor: &Actor, request: &SettlementRequest) -> CoreResult<Self> {
        match actor.kind {
            ActorKind::Staff | ActorKind::Admin => {
                actor.require_employee_for(request.store_id, "settle sales")?;
                Ok(SettlementParties {
                    member_id: request.member_id,
                    staff_id: Some(actor.id),
                })
            }
            ActorKind::Member => {
                if let Some(other) = request.member_id {
                    if other != actor.id {
                        return Err(CoreError::not_permitted(
                            actor.id,
                            format!("settle an order for member {}", other),
                        ));
                    }
                }
                Ok(SettlementParties {
                    member_id: Some(actor.id),
                    staff_id: None,
                })
            }
        }
    }
}

/// Trimmed, length-checked staff and coupon codes.
pub fn normalize_codes(
    request: &SettlementRequest,
) -> CoreResult<(Option<String>, Option<String>)> {
    let staff_code = validate_free_text("staff_code", request.staff_code.as_deref())?;
    let coupon_code = validate_free_text("coupon_code", request.coupon_code.as_deref())?;
    Ok((staff_code, coupon_code))
}

// =============================================================================
// Totals
// =============================================================================

/// A cart line priced from the catalog at settlement time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl PricedLine {
    /// unit_price × quantity.
    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// Computes the order total and its display tax split.
///
/// A zero total is rejected: an order that moves stock for nothing is
/// almost always a pricing mistake.
pub fn settlement_totals(lines: &[PricedLine], rate: TaxRate) -> CoreResult<TaxSplit> {
    let mut total = Money::zero();
    for line in lines {
        total = line
            .unit_price
            .checked_multiply_quantity(line.quantity)
            .and_then(|subtotal| total.checked_add(subtotal))
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "total_amount".to_string(),
                min: 1,
                max: i64::MAX,
            })?;
    }

    if !total.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "total_amount".to_string(),
        }
        .into());
    }

    Ok(total.split_inclusive_tax(rate))
}

// =============================================================================
// Unit Tests
// =============================================================================
