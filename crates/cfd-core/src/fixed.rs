//! Fixed-point financial arithmetic.
//!
//! All monetary and quantity values are integers scaled by 10^8, which
//! eliminates binary floating-point rounding error in balance, margin and
//! PnL computation. Multiplication and division truncate toward zero on
//! the final division; this truncation is an observable policy of the
//! arithmetic, not an artifact.

use crate::error::{CoreError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// Scale factor: 10^8 gives 8 implied decimal digits.
pub const SCALE: i64 = 100_000_000;

/// A fixed-point value: the underlying decimal multiplied by [`SCALE`].
///
/// Wraps `i64` to keep scaled values from mixing with plain integers.
/// Intermediate products are widened to `i128` so `mul`/`div` cannot
/// overflow for any pair of representable operands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Scaled(pub i64);

impl Scaled {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn raw(self) -> i64 {
        self.0
    }

    /// Convert a decimal to its scaled representation, rounding to nearest
    /// (midpoint away from zero) before scaling.
    pub fn try_from_decimal(value: Decimal) -> Result<Self> {
        let scaled = (value * Decimal::from(SCALE))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        scaled
            .to_i64()
            .map(Self)
            .ok_or_else(|| CoreError::InvalidNumber(value.to_string()))
    }

    /// Convert an `f64` to its scaled representation.
    ///
    /// Fails with `InvalidNumber` on NaN and ±infinity, and on values whose
    /// scaled magnitude does not fit in `i64`.
    pub fn from_f64(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(CoreError::InvalidNumber(value.to_string()));
        }
        let scaled = (value * SCALE as f64).round();
        if scaled >= i64::MAX as f64 || scaled <= i64::MIN as f64 {
            return Err(CoreError::InvalidNumber(value.to_string()));
        }
        Ok(Self(scaled as i64))
    }

    /// Scaled representation of a small unsigned integer (e.g. leverage).
    #[inline]
    pub fn from_int(value: u32) -> Self {
        Self(i64::from(value) * SCALE)
    }

    /// Exact inverse of `try_from_decimal` modulo the 8-digit precision.
    #[inline]
    pub fn to_decimal(self) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(self.0), 8)
    }

    /// Scaled multiplication: `a * b / SCALE`, truncating toward zero.
    #[inline]
    pub fn mul_scaled(self, rhs: Self) -> Self {
        let wide = i128::from(self.0) * i128::from(rhs.0) / i128::from(SCALE);
        Self(wide as i64)
    }

    /// Scaled division: `a * SCALE / b`, truncating toward zero.
    ///
    /// Fails with `DivisionByZero` when `b` is zero.
    #[inline]
    pub fn div_scaled(self, rhs: Self) -> Result<Self> {
        if rhs.0 == 0 {
            return Err(CoreError::DivisionByZero);
        }
        let wide = i128::from(self.0) * i128::from(SCALE) / i128::from(rhs.0);
        Ok(Self(wide as i64))
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Strictly positive. Prices and quantities must satisfy this.
    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Magnitude of a (possibly negative) PnL value.
    #[inline]
    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }
}

impl fmt::Display for Scaled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl FromStr for Scaled {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let d = Decimal::from_str(s)?;
        Self::try_from_decimal(d)
    }
}

impl Add for Scaled {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Scaled {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Scaled {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Scaled {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Scaled {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

/// Position notional: `qty * price`.
#[inline]
pub fn position_amount(qty: Scaled, price: Scaled) -> Scaled {
    qty.mul_scaled(price)
}

/// Margin reserved for a position: `positionAmount / leverage`.
pub fn margin_for(amount: Scaled, leverage: u32) -> Result<Scaled> {
    amount.div_scaled(Scaled::from_int(leverage))
}

/// PnL for a LONG position: `(currentPrice - entryPrice) * qty`.
#[inline]
pub fn long_pnl(entry_price: Scaled, current_price: Scaled, qty: Scaled) -> Scaled {
    (current_price - entry_price).mul_scaled(qty)
}

/// PnL for a SHORT position: `(entryPrice - currentPrice) * qty`.
#[inline]
pub fn short_pnl(entry_price: Scaled, current_price: Scaled, qty: Scaled) -> Scaled {
    (entry_price - current_price).mul_scaled(qty)
}

/// Balance check for margin reservation.
#[inline]
pub fn has_sufficient_balance(balance: Scaled, margin: Scaled) -> bool {
    balance >= margin
}
