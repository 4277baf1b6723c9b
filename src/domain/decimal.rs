//! Lossless decimal numeric type backed by rust_decimal.
//!
//! Money and share quantities stay in `Decimal` end to end; floating point is
//! only used at the edges (annualized ROI exponentiation).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lossless decimal for prices, fees, cash amounts, and quantities.
///
/// Backed by rust_decimal to avoid floating-point drift.
/// Serializes to a JSON number (not a string) by default.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Decimal {
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse a Decimal from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Decimal)
    }

    /// Format as a canonical string: trailing zeros stripped, no exponent.
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    pub fn one() -> Self {
        Decimal(RustDecimal::ONE)
    }

    /// The option contract multiplier (100 shares per contract).
    pub fn contract_multiplier() -> Self {
        Decimal(RustDecimal::ONE_HUNDRED)
    }

    pub fn from_i64(value: i64) -> Self {
        Decimal(RustDecimal::from(value))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }

    pub fn min(self, other: Self) -> Self {
        if self <= other {
            self
        } else {
            other
        }
    }

    /// Lossy conversion for ratio math (ROI annualization). Not for money.
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::SubAssign for Decimal {
    fn sub_assign(&mut self, rhs: Decimal) {
        self.0 -= rhs.0;
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl std::iter::Sum for Decimal {
    fn sum<I: Iterator<Item = Decimal>>(iter: I) -> Decimal {
        iter.fold(Decimal::zero(), |acc, d| acc + d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_parse_roundtrip() {
        for s in ["123.456", "0.0001", "1000000", "-123.456", "0", "853.4"] {
            let d = dec(s);
            let reparsed = dec(&d.to_canonical_string());
            assert_eq!(d, reparsed, "roundtrip failed for {}", s);
        }
    }

    #[test]
    fn test_canonical_strips_trailing_zeros() {
        assert_eq!(dec("140.00").to_canonical_string(), "140");
        assert_eq!(dec("140.50").to_canonical_string(), "140.5");
    }

    #[test]
    fn test_arithmetic_is_exact() {
        let total = dec("853.40") + dec("1706.80");
        assert_eq!(total, dec("2560.20"));

        let mut acc = Decimal::zero();
        acc += dec("0.1");
        acc += dec("0.2");
        assert_eq!(acc, dec("0.3"));
    }

    #[test]
    fn test_min_and_abs() {
        assert_eq!(dec("3").min(dec("7")), dec("3"));
        assert_eq!(dec("-4.5").abs(), dec("4.5"));
    }

    #[test]
    fn test_sum() {
        let sum: Decimal = vec![dec("1.1"), dec("2.2"), dec("3.3")].into_iter().sum();
        assert_eq!(sum, dec("6.6"));
    }

    #[test]
    fn test_json_serializes_as_number() {
        let json = serde_json::to_value(dec("123.456")).unwrap();
        assert!(json.is_number());
    }

    #[test]
    fn test_to_f64() {
        assert!((dec("2.5").to_f64() - 2.5).abs() < 1e-12);
    }
}
