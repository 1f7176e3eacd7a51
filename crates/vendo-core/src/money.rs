//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                         │
//! │                                                                     │
//! │  In floating point:                                                 │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                       │
//! │                                                                     │
//! │  A refund ledger cannot tolerate drifting cents. Every monetary     │
//! │  value in Vendo is an integer count of the smallest currency unit,  │
//! │  and every proportional split rounds exactly once, at the end.      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use vendo_core::money::Money;
//!
//! let price = Money::from_cents(1099); // $10.99
//! let line = price * 3;                // $32.97
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative intermediate values during
///   reconciliation, even though ledger records store non-negative amounts
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero money value.
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

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Calculates tax on this amount.
    ///
    /// `rate_bps` is in basis points: 825 = 8.25%. Rounds half-up, once.
    ///
    /// ## Example
    /// ```rust
    /// use vendo_core::money::Money;
    ///
    /// let base = Money::from_cents(1000); // $10.00
    /// assert_eq!(base.calculate_tax(825).cents(), 83); // $0.825 → $0.83
    /// ```
    pub fn calculate_tax(&self, rate_bps: u32) -> Money {
        // i128 prevents overflow on large amounts; +5000 rounds half-up
        let tax_cents = (self.0 as i128 * rate_bps as i128 + 5000) / 10000;
        Money::from_cents(tax_cents as i64)
    }

    /// Applies a percentage discount and returns the discounted amount.
    ///
    /// ## Arguments
    /// * `discount_bps` - Discount in basis points (1000 = 10%)
    ///
    /// ## Example
    /// ```rust
    /// use vendo_core::money::Money;
    ///
    /// let list = Money::from_cents(10000); // $100.00
    /// assert_eq!(list.apply_discount_bps(1000).cents(), 9000); // 10% off
    /// ```
    pub fn apply_discount_bps(&self, discount_bps: u32) -> Money {
        let discount_amount = (self.0 as i128 * discount_bps as i128 + 5000) / 10000;
        Money::from_cents(self.0 - discount_amount as i64)
    }

    /// Returns this amount's proportional share of `aggregate`, where this
    /// amount is `part` of `whole`.
    ///
    /// Used to split an aggregate figure (a cart-level discount, a tax
    /// total) across refunded lines in proportion to their share of the
    /// refund subtotal:
    ///
    /// ```text
    /// share = aggregate × (self / whole)
    /// ```
    ///
    /// The division happens exactly once, in i128, rounding half-up - so a
    /// series of partial refunds cannot drift more than one cent from a
    /// single full refund of the same lines.
    ///
    /// Returns zero when `whole` is zero (nothing to apportion against).
    ///
    /// ## Example
    /// ```rust
    /// use vendo_core::money::Money;
    ///
    /// // Refunding $4.50 of a $10.00 subtotal that carried a $1.00 discount:
    /// let share = Money::from_cents(450)
    ///     .proportion_of(Money::from_cents(100), Money::from_cents(1000));
    /// assert_eq!(share.cents(), 45);
    /// ```
    pub fn proportion_of(&self, aggregate: Money, whole: Money) -> Money {
        if whole.is_zero() || aggregate.is_zero() {
            return Money::zero();
        }
        let numer = self.0 as i128 * aggregate.0 as i128;
        let denom = whole.0 as i128;
        // Round half-up (half away from zero for negative intermediates)
        let half = denom / 2;
        let share = if numer >= 0 {
            (numer + half) / denom
        } else {
            (numer - half) / denom
        };
        Money::from_cents(share as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display is for logs and debugging; UI layers own user-facing formatting.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
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

// =============================================================================
// Unit Tests
// =============================================================================
