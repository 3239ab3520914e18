//! Signed fixed-point numeric type backed by rust_decimal.
//!
//! Every monetary and position quantity in the ledger is a [`Fixed`]. Products and
//! quotients are truncated toward zero to [`Fixed::SCALE`] fractional digits so the whole
//! ledger works at one precision.

use rust_decimal::{Decimal as RustDecimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Hard arithmetic faults. Never wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("fixed-point overflow")]
    Overflow,
    #[error("fixed-point division by zero")]
    DivisionByZero,
}

/// Signed fixed-point number with a single global scale.
///
/// Serializes to a JSON string so no precision is lost on the wire.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Fixed(#[serde(with = "rust_decimal::serde::str")] RustDecimal);

impl Fixed {
    /// Number of fractional digits kept after every multiplication or division.
    pub const SCALE: u32 = 18;

    pub const ZERO: Fixed = Fixed(RustDecimal::ZERO);
    pub const ONE: Fixed = Fixed(RustDecimal::ONE);

    /// Wrap a RustDecimal, truncating it to the global scale.
    pub fn new(value: RustDecimal) -> Self {
        Fixed(truncate(value))
    }

    pub fn from_int(value: i64) -> Self {
        Fixed(RustDecimal::from(value))
    }

    /// Parse a Fixed from a decimal string, truncating extra digits.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Fixed::new)
    }

    /// Format without exponent notation and without trailing zeros.
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn zero() -> Self {
        Self::ZERO
    }

    pub fn one() -> Self {
        Self::ONE
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
        Fixed(self.0.abs())
    }

    pub fn try_add(self, rhs: Fixed) -> Result<Fixed, ArithmeticError> {
        self.0
            .checked_add(rhs.0)
            .map(Fixed)
            .ok_or(ArithmeticError::Overflow)
    }

    pub fn try_sub(self, rhs: Fixed) -> Result<Fixed, ArithmeticError> {
        self.0
            .checked_sub(rhs.0)
            .map(Fixed)
            .ok_or(ArithmeticError::Overflow)
    }

    pub fn try_mul(self, rhs: Fixed) -> Result<Fixed, ArithmeticError> {
        self.0
            .checked_mul(rhs.0)
            .map(Fixed::new)
            .ok_or(ArithmeticError::Overflow)
    }

    pub fn try_div(self, rhs: Fixed) -> Result<Fixed, ArithmeticError> {
        if rhs.is_zero() {
            return Err(ArithmeticError::DivisionByZero);
        }
        self.0
            .checked_div(rhs.0)
            .map(Fixed::new)
            .ok_or(ArithmeticError::Overflow)
    }

    /// Divide, yielding zero instead of an error when `rhs` is zero.
    pub fn div_or_zero(self, rhs: Fixed) -> Result<Fixed, ArithmeticError> {
        if rhs.is_zero() {
            return Ok(Fixed::ZERO);
        }
        self.try_div(rhs)
    }
}

fn truncate(value: RustDecimal) -> RustDecimal {
    value.round_dp_with_strategy(Fixed::SCALE, RoundingStrategy::ToZero)
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Fixed {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Fixed {
    fn from(value: RustDecimal) -> Self {
        Fixed::new(value)
    }
}

impl From<Fixed> for RustDecimal {
    fn from(value: Fixed) -> Self {
        value.0
    }
}

impl From<i64> for Fixed {
    fn from(value: i64) -> Self {
        Fixed::from_int(value)
    }
}

// Infallible operators panic on overflow; ledger code uses the try_* forms.
impl std::ops::Add for Fixed {
    type Output = Fixed;

    fn add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Fixed {
    type Output = Fixed;

    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0 - rhs.0)
    }
}

impl std::ops::Neg for Fixed {
    type Output = Fixed;

    fn neg(self) -> Fixed {
        Fixed(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(s: &str) -> Fixed {
        Fixed::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_fixed_canonical_no_exponent() {
        let value = f("123");
        let formatted = value.to_canonical_string();
        assert!(!formatted.contains('e'));
        assert_eq!(formatted, "123");
        assert_eq!(f("1.500").to_string(), "1.5");
    }

    #[test]
    fn test_fixed_parse_truncates_to_scale() {
        let value = f("0.1234567890123456789999");
        assert_eq!(value.to_canonical_string(), "0.123456789012345678");
        let negative = f("-0.0000000000000000019");
        assert_eq!(negative.to_canonical_string(), "-0.000000000000000001");
    }

    #[test]
    fn test_fixed_checked_arithmetic() {
        let a = f("10.5");
        let b = f("2.5");
        assert_eq!(a.try_add(b).unwrap(), f("13"));
        assert_eq!(a.try_sub(b).unwrap(), f("8"));
        assert_eq!(a.try_mul(b).unwrap(), f("26.25"));
        assert_eq!(a.try_div(b).unwrap(), f("4.2"));
    }

    #[test]
    fn test_fixed_division_truncates_toward_zero() {
        let third = Fixed::ONE.try_div(Fixed::from_int(3)).unwrap();
        assert_eq!(third.to_canonical_string(), "0.333333333333333333");
        let neg_third = (-Fixed::ONE).try_div(Fixed::from_int(3)).unwrap();
        assert_eq!(neg_third, -third);
    }

    #[test]
    fn test_fixed_division_by_zero_is_error() {
        assert_eq!(
            Fixed::ONE.try_div(Fixed::ZERO),
            Err(ArithmeticError::DivisionByZero)
        );
        assert_eq!(Fixed::ONE.div_or_zero(Fixed::ZERO), Ok(Fixed::ZERO));
    }

    #[test]
    fn test_fixed_overflow_is_error_not_wraparound() {
        let max = Fixed(RustDecimal::MAX);
        assert_eq!(max.try_add(Fixed::ONE), Err(ArithmeticError::Overflow));
        assert_eq!(max.try_mul(Fixed::from_int(2)), Err(ArithmeticError::Overflow));
        assert_eq!((-max).try_sub(Fixed::ONE), Err(ArithmeticError::Overflow));
    }

    #[test]
    fn test_fixed_sign_predicates() {
        assert!(f("1").is_positive());
        assert!(f("-1").is_negative());
        assert!(!Fixed::ZERO.is_positive());
        assert!(!Fixed::ZERO.is_negative());
        assert_eq!(f("-3").abs(), f("3"));
        assert_eq!(f("2").min(f("3")), f("2"));
        assert_eq!(f("2").max(f("3")), f("3"));
    }

    #[test]
    fn test_fixed_json_is_string() {
        let value = f("123.456");
        let json = serde_json::to_value(value).unwrap();
        assert!(json.is_string());
        assert_eq!(json, serde_json::json!("123.456"));
        let back: Fixed = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_fixed_numeric_equality_ignores_trailing_zeros() {
        assert_eq!(f("1.0"), f("1"));
        assert!(f("10") > f("9.999"));
    }
}
