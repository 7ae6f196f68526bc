//! Money type for representing currency amounts
//!
//! Amounts are signed fixed-point cents (i64). Decimal input from clients is
//! converted once at the boundary by [`Money::from_major`] or [`Money::parse`];
//! everything past that point is integer arithmetic.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{LedgerError, LedgerResult};

const CENTS_PER_UNIT: i64 = 100;

/// A signed amount in cents
///
/// Serializes as the integer number of cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Create an amount from cents
    ///
    /// ```
    /// use ledgerwise::models::Money;
    /// assert_eq!(Money::from_cents(1050).to_string(), "$10.50");
    /// ```
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Magnitude, saturating at `i64::MAX`
    pub const fn abs(&self) -> Self {
        Self(self.0.saturating_abs())
    }

    /// Convert a decimal major-unit amount (e.g. 12.34) into cents
    ///
    /// Rounds half away from zero. NaN, infinities and values outside the i64
    /// cent range are rejected with `InvalidAmount`.
    pub fn from_major(amount: f64) -> LedgerResult<Self> {
        if !amount.is_finite() {
            return Err(LedgerError::InvalidAmount(format!(
                "amount must be a finite number, got {}",
                amount
            )));
        }
        let cents = (amount * CENTS_PER_UNIT as f64).round();
        if cents >= i64::MAX as f64 || cents <= i64::MIN as f64 {
            return Err(LedgerError::InvalidAmount(format!(
                "amount {} is out of range",
                amount
            )));
        }
        Ok(Self(cents as i64))
    }

    /// Like [`Money::from_major`] but also rejects zero
    pub fn nonzero_from_major(amount: f64) -> LedgerResult<Self> {
        let money = Self::from_major(amount)?;
        if money.is_zero() {
            return Err(LedgerError::InvalidAmount("amount must not be zero".into()));
        }
        Ok(money)
    }

    /// Amount in major units
    pub fn as_major(&self) -> f64 {
        self.0 as f64 / CENTS_PER_UNIT as f64
    }

    /// Checked addition, `InvalidAmount` on overflow
    pub fn checked_add(self, other: Self) -> LedgerResult<Self> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or_else(|| LedgerError::InvalidAmount("amount overflow".into()))
    }

    /// Checked subtraction, `InvalidAmount` on overflow
    pub fn checked_sub(self, other: Self) -> LedgerResult<Self> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or_else(|| LedgerError::InvalidAmount("amount overflow".into()))
    }

    /// Sum that fails with `InvalidAmount` instead of saturating
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> LedgerResult<Self> {
        amounts
            .into_iter()
            .try_fold(Self::zero(), |total, amount| total.checked_add(amount))
    }

    /// Parse a decimal amount typed by a user
    ///
    /// Accepts an optional sign and currency symbol, thousands separators and
    /// up to two decimals: "10.5", "-$1,200.00", "$-3", "100".
    pub fn parse(s: &str) -> Result<Self, MoneyParseError> {
        let input = s.trim();
        if input.is_empty() {
            return Err(MoneyParseError::Empty);
        }

        let (negative, rest) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };
        let rest = rest.strip_prefix('$').unwrap_or(rest);
        let (negative, rest) = match rest.strip_prefix('-') {
            Some(inner) if !negative => (true, inner),
            _ => (negative, rest),
        };

        let digits: String = rest.chars().filter(|c| *c != ',').collect();
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits.as_str(), ""));

        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
            return Err(MoneyParseError::InvalidFormat(input.to_string()));
        }
        if fraction.len() > 2 {
            return Err(MoneyParseError::TooPrecise(input.to_string()));
        }

        let units: i64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| MoneyParseError::OutOfRange(input.to_string()))?
        };
        let fraction_cents = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().unwrap_or(0) * 10,
            _ => fraction.parse::<i64>().unwrap_or(0),
        };

        let cents = units
            .checked_mul(CENTS_PER_UNIT)
            .and_then(|c| c.checked_add(fraction_cents))
            .ok_or_else(|| MoneyParseError::OutOfRange(input.to_string()))?;

        Ok(Self(if negative { -cents } else { cents }))
    }

    /// Format with a currency symbol, e.g. `-€12.30`
    pub fn format_with_symbol(&self, symbol: &str) -> String {
        let magnitude = self.0.unsigned_abs();
        let units = magnitude / CENTS_PER_UNIT as u64;
        let cents = magnitude % CENTS_PER_UNIT as u64;
        let sign = if self.is_negative() { "-" } else { "" };
        format!("{}{}{}.{:02}", sign, symbol, units, cents)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.format_with_symbol("$"))
    }
}

// Operators saturate at the i64 bounds. Code that must detect overflow uses
// the checked_* methods or `Money::checked_sum`.
impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

impl<'a> std::iter::Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Error type for money parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyParseError {
    #[error("Empty amount")]
    Empty,

    #[error("Invalid money format: {0}")]
    InvalidFormat(String),

    #[error("At most two decimals are allowed: {0}")]
    TooPrecise(String),

    #[error("Amount out of range: {0}")]
    OutOfRange(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1050).to_string(), "$10.50");
        assert_eq!(Money::zero().to_string(), "$0.00");
        assert_eq!(Money::from_cents(-1050).to_string(), "-$10.50");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-5).to_string(), "-$0.05");
        assert_eq!(format!("{:>8}", Money::from_cents(100)), "   $1.00");
    }

    #[test]
    fn test_format_with_symbol() {
        assert_eq!(Money::from_cents(-1230).format_with_symbol("€"), "-€12.30");
        assert_eq!(Money::from_cents(i64::MIN).format_with_symbol(""), "-92233720368547758.08");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!(a + b, Money::from_cents(1500));
        assert_eq!(a - b, Money::from_cents(500));
        assert_eq!(-a, Money::from_cents(-1000));

        let mut c = a;
        c += b;
        c -= Money::from_cents(200);
        assert_eq!(c.cents(), 1300);

        let total: Money = [a, b, -b].iter().sum();
        assert_eq!(total, a);
    }

    #[test]
    fn test_parse() {
        assert_eq!(Money::parse("10.50").unwrap().cents(), 1050);
        assert_eq!(Money::parse("10.5").unwrap().cents(), 1050);
        assert_eq!(Money::parse("100").unwrap().cents(), 10000);
        assert_eq!(Money::parse("$1,200.00").unwrap().cents(), 120_000);
        assert_eq!(Money::parse("-$3").unwrap().cents(), -300);
        assert_eq!(Money::parse("$-3").unwrap().cents(), -300);
        assert_eq!(Money::parse(".25").unwrap().cents(), 25);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Money::parse("  "), Err(MoneyParseError::Empty));
        assert!(matches!(Money::parse("abc"), Err(MoneyParseError::InvalidFormat(_))));
        assert!(matches!(Money::parse("1.2.3"), Err(MoneyParseError::InvalidFormat(_))));
        assert!(matches!(Money::parse("--1"), Err(MoneyParseError::InvalidFormat(_))));
        assert!(matches!(Money::parse("1.005"), Err(MoneyParseError::TooPrecise(_))));
        assert!(matches!(
            Money::parse("99999999999999999999"),
            Err(MoneyParseError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_serializes_as_cents() {
        assert_eq!(serde_json::to_string(&Money::from_cents(-1234)).unwrap(), "-1234");
        let m: Money = serde_json::from_str("500").unwrap();
        assert_eq!(m, Money::from_cents(500));
    }

    #[test]
    fn test_from_major_rounds_to_cents() {
        assert_eq!(Money::from_major(12.34).unwrap().cents(), 1234);
        assert_eq!(Money::from_major(-0.005).unwrap().cents(), -1);
        assert_eq!(Money::from_major(1000.0).unwrap().cents(), 100_000);
        assert_eq!(Money::from_cents(-250).as_major(), -2.5);
    }

    #[test]
    fn test_from_major_rejects_non_finite() {
        assert!(matches!(
            Money::from_major(f64::NAN),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(Money::from_major(f64::INFINITY).is_err());
        assert!(Money::from_major(1e300).is_err());
        assert!(Money::nonzero_from_major(0.0).is_err());
        assert!(Money::nonzero_from_major(0.001).is_err());
    }

    #[test]
    fn test_operators_saturate() {
        let max = Money::from_cents(i64::MAX);
        assert_eq!(max + max, max);
        assert_eq!(Money::from_cents(i64::MIN) - max, Money::from_cents(i64::MIN));
        assert_eq!(-Money::from_cents(i64::MIN), max);
        let total: Money = [max, max, Money::from_cents(-1)].iter().sum();
        assert_eq!(total, Money::from_cents(i64::MAX - 1));
    }

    #[test]
    fn test_checked_sum() {
        let big = Money::from_major(5.0e16).unwrap();
        assert!(Money::checked_sum([big, big]).is_err());
        assert!(Money::from_cents(i64::MIN).checked_sub(Money::from_cents(1)).is_err());
        assert_eq!(
            Money::checked_sum([big, -big, Money::from_cents(3)]).unwrap(),
            Money::from_cents(3)
        );
    }

    #[test]
    fn test_checked_add_overflow() {
        let max = Money::from_cents(i64::MAX);
        assert!(max.checked_add(Money::from_cents(1)).is_err());
        assert_eq!(
            Money::from_cents(5).checked_add(Money::from_cents(7)).unwrap(),
            Money::from_cents(12)
        );
    }
}
