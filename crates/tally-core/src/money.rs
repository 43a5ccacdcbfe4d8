//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Inclusive tax extraction with floats:                                  │
//! │    1100 × 0.1 / 1.1 = 99.99999999999999  → floor = 99  ❌ WRONG!        │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units                                      │
//! │    1100 × 1000 / 11000 = 100  (exact integer division)  ✅              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All amounts are in minor currency units and tax-inclusive. There is one
//! currency per deployment, so `Money` carries no currency code.
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//! use tally_core::INCLUSIVE_TAX_RATE;
//!
//! let total = Money::from_minor(1100);
//! let split = total.split_inclusive_tax(INCLUSIVE_TAX_RATE);
//! assert_eq!(split.tax.minor(), 100);
//! assert_eq!(split.subtotal.minor(), 1000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Where Money is Used
/// ```text
/// Product.price ──► OrderLine.unit_price ──► OrderLine.subtotal
///                                                   │
///                                                   ▼
///                                  Σ subtotals = Order.total_amount
///                                                   │
///                                                   ▼
///                               split_inclusive_tax() → receipt display
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let unit_price = Money::from_minor(150);
    /// assert_eq!(unit_price.multiply_quantity(3).minor(), 450);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// `price × qty`, `None` on overflow.
    #[inline]
    pub const fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(minor) => Some(Money(minor)),
            None => None,
        }
    }

    /// `self + other`, `None` on overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(minor) => Some(Money(minor)),
            None => None,
        }
    }

    /// Extracts the tax already contained in a tax-inclusive amount.
    ///
    /// ## Formula
    /// ```text
    /// tax      = floor(total × rate / (1 + rate))
    ///          = floor(total × bps / (10000 + bps))     (integer math)
    /// subtotal = total − tax
    /// ```
    ///
    /// The split is display-only: `total` is never changed by it, and
    /// `subtotal + tax == total` holds for every input.
    pub fn split_inclusive_tax(&self, rate: TaxRate) -> TaxSplit {
        let bps = i128::from(rate.bps());
        let tax = (i128::from(self.0) * bps).div_euclid(10_000 + bps);
        let tax = Money::from_minor(tax as i64);

        TaxSplit {
            total: *self,
            tax,
            subtotal: *self - tax,
        }
    }
}

// =============================================================================
// Tax Split
// =============================================================================

/// A tax-inclusive total broken into its net and tax parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxSplit {
    /// Tax-inclusive total (what the customer paid).
    pub total: Money,
    /// Tax contained in the total.
    pub tax: Money,
    /// Total minus tax.
    pub subtotal: Money,
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display groups thousands (`12,345`). No currency symbol: frontends
/// localise.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        if self.0 < 0 {
            write!(f, "-{}", grouped)
        } else {
            write!(f, "{}", grouped)
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::INCLUSIVE_TAX_RATE;

    #[test]
    fn test_from_minor() {
        let money = Money::from_minor(1099);
        assert_eq!(money.minor(), 1099);
        assert!(money.is_positive());
        assert!(!money.is_zero());
    }

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Money::from_minor(0).to_string(), "0");
        assert_eq!(Money::from_minor(999).to_string(), "999");
        assert_eq!(Money::from_minor(1100).to_string(), "1,100");
        assert_eq!(Money::from_minor(1234567).to_string(), "1,234,567");
        assert_eq!(Money::from_minor(-25000).to_string(), "-25,000");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_minor(1000);
        let b = Money::from_minor(500);

        assert_eq!((a + b).minor(), 1500);
        assert_eq!((a - b).minor(), 500);
        assert_eq!((a * 3).minor(), 3000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.minor(), 2000);
    }

    #[test]
    fn test_checked_arithmetic() {
        let price = Money::from_minor(1000);
        assert_eq!(price.checked_multiply_quantity(3), Some(Money::from_minor(3000)));
        assert_eq!(price.checked_add(price), Some(Money::from_minor(2000)));

        assert_eq!(Money::from_minor(i64::MAX / 2).checked_multiply_quantity(3), None);
        assert_eq!(Money::from_minor(i64::MAX).checked_add(Money::from_minor(1)), None);
    }

    #[test]
    fn test_tax_extraction_example() {
        let split = Money::from_minor(1100).split_inclusive_tax(INCLUSIVE_TAX_RATE);
        assert_eq!(split.tax.minor(), 100);
        assert_eq!(split.subtotal.minor(), 1000);
        assert_eq!(split.total.minor(), 1100);
    }

    #[test]
    fn test_tax_extraction_floors() {
        // 1000 × 1000 / 11000 = 90.9 → 90
        let split = Money::from_minor(1000).split_inclusive_tax(INCLUSIVE_TAX_RATE);
        assert_eq!(split.tax.minor(), 90);
        assert_eq!(split.subtotal.minor(), 910);

        // 10 × 1000 / 11000 = 0.9 → 0
        let split = Money::from_minor(10).split_inclusive_tax(INCLUSIVE_TAX_RATE);
        assert_eq!(split.tax.minor(), 0);
    }

    /// subtotal + tax == total for every total, and tax matches floor(total / 11).
    #[test]
    fn test_tax_split_identity() {
        for total in 0..=50_000_i64 {
            let split = Money::from_minor(total).split_inclusive_tax(INCLUSIVE_TAX_RATE);
            assert_eq!(split.subtotal + split.tax, split.total);
            assert_eq!(split.tax.minor(), total / 11, "total={}", total);
        }
    }

    #[test]
    fn test_tax_extraction_zero_rate() {
        let split = Money::from_minor(1100).split_inclusive_tax(TaxRate::zero());
        assert!(split.tax.is_zero());
        assert_eq!(split.subtotal.minor(), 1100);
    }
}
