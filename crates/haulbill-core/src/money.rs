//! # Money Module
//!
//! Integer-cent money for sales line totals and invoice running totals.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Disposal rates are per m³, volumes are fractional:                    │
//! │                                                                         │
//! │    12.345 m³ × $18.75/m³ = $231.46875                                   │
//! │                                                                         │
//! │  Quantities travel as thousandths (12345), rates as cents (1875):      │
//! │    12345 × 1875 / 1000 = 23146.875 → 23147 cents                       │
//! │                                                                         │
//! │  One rounding step, in integers, at the line level.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use haulbill_core::money::Money;
//!
//! let rate = Money::from_cents(1875);
//! let total = rate.multiply_thousandths(12_345);
//! assert_eq!(total.cents(), 23_147);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};

/// A monetary value in the smallest currency unit (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a per-unit rate by a quantity expressed in thousandths.
    ///
    /// Rounds half away from zero, so reversal lines (negative quantity)
    /// mirror their originals exactly.
    ///
    /// ## Example
    /// ```rust
    /// use haulbill_core::money::Money;
    ///
    /// let rate = Money::from_cents(1000); // $10.00 per m³
    /// assert_eq!(rate.multiply_thousandths(1_500).cents(), 1_500);
    /// assert_eq!(rate.multiply_thousandths(-1_500).cents(), -1_500);
    /// ```
    pub fn multiply_thousandths(&self, quantity_milli: i64) -> Money {
        // i128 keeps large rate × volume products from overflowing
        let product = self.0 as i128 * quantity_milli as i128;
        let rounded = if product >= 0 {
            (product + 500) / 1000
        } else {
            (product - 500) / 1000
        };
        Money(rounded as i64)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.dollars().abs(), self.cents_part())
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
