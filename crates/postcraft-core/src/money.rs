//! # Money Module
//!
//! The `Money` type for plan prices, discounts and charges.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every amount is stored in MINOR units (paise for INR):                 │
//! │                                                                         │
//! │    ₹799.00  →  79_900                                                   │
//! │                                                                         │
//! │  The only place a fraction can appear is a percentage discount.         │
//! │  It is computed in i128 and rounded half-up in integer arithmetic:      │
//! │                                                                         │
//! │    (amount * pct + 50) / 100                                            │
//! │                                                                         │
//! │  No f64 ever touches a price.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use postcraft_core::money::Money;
//!
//! let price = Money::from_minor(79_900); // ₹799.00
//! let half = price.percentage(50);
//! assert_eq!(half.minor(), 39_950);
//! assert_eq!(price.saturating_sub(Money::from_minor(100_000)), Money::zero());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// Signed so that a misconfigured record can be represented and rejected,
/// but every amount that leaves the pricing engine is non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use postcraft_core::money::Money;
    ///
    /// let price = Money::from_minor(99_900);
    /// assert_eq!(price.minor(), 99_900);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Whole rupees.
    #[inline]
    const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Paise portion, always 0-99.
    #[inline]
    const fn minor_part(&self) -> i64 {
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

    /// `pct` percent of this amount, rounded half-up.
    ///
    /// Computed as `(amount * pct + 50) / 100` in i128, so there is no
    /// overflow for any i64 amount and no floating point involved.
    ///
    /// ## Example
    /// ```rust
    /// use postcraft_core::money::Money;
    ///
    /// // 15% of 333 = 49.95 → 50
    /// assert_eq!(Money::from_minor(333).percentage(15).minor(), 50);
    /// // 15% of 330 = 49.5 → 50 (half rounds up)
    /// assert_eq!(Money::from_minor(330).percentage(15).minor(), 50);
    /// // 15% of 329 = 49.35 → 49
    /// assert_eq!(Money::from_minor(329).percentage(15).minor(), 49);
    /// ```
    pub fn percentage(&self, pct: i64) -> Money {
        let scaled = self.0 as i128 * pct as i128;
        // Half-up for non-negative products; mirror it for negatives so the
        // rounding is symmetric around zero.
        let rounded = if scaled >= 0 {
            (scaled + 50) / 100
        } else {
            (scaled - 50) / 100
        };
        Money(rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }

    /// Subtraction that never goes below zero.
    #[inline]
    pub fn saturating_sub(self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }

    /// Smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// For logs and debugging only; the UI formats with the user's locale.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl From<i64> for Money {
    fn from(minor: i64) -> Self {
        Money(minor)
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

// =============================================================================
// Unit Tests
// =============================================================================
