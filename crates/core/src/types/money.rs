//! Fixed-point money using decimal arithmetic.
//!
//! All amounts in the ordering engine share one currency, configured
//! outside the engine, so `Money` carries only the amount. Every constructor
//! normalises to two fractional digits; floating point never touches a price.
//!
//! Amounts are bounded by [`Money::MAX`] in magnitude, the range of a
//! `NUMERIC(10,2)` column. There are no arithmetic operators: the checked
//! methods return `None` instead of overflowing or leaving that range, and
//! deserialization rejects out-of-range input.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A decimal outside the range `Money` can hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("amount {0} is out of range (at most {max} in magnitude)", max = Money::MAX)]
pub struct MoneyRangeError(pub Decimal);

/// A monetary amount with two fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Zero, at cent scale.
    pub const ZERO: Self = Self(Decimal::from_parts(0, 0, 0, false, 2));

    /// 99,999,999.99, the largest storable amount.
    pub const MAX: Self = Self(Decimal::from_parts(1_410_065_407, 2, 0, false, 2));

    /// Wrap a decimal, rounding to cents.
    ///
    /// The range is not checked here; values read back from storage are
    /// in range already, and the checked methods reject anything else.
    #[must_use]
    pub fn new(amount: Decimal) -> Self {
        let mut cents = amount.round_dp(2);
        cents.rescale(2);
        Self(cents)
    }

    /// Build from an integer number of cents.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// Round to cents, or `None` if the magnitude exceeds [`Self::MAX`].
    #[must_use]
    pub fn bounded(amount: Decimal) -> Option<Self> {
        let money = Self::new(amount);
        money.is_in_range().then_some(money)
    }

    /// The underlying decimal.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether the amount is below zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Whether the magnitude is at most [`Self::MAX`].
    #[must_use]
    pub fn is_in_range(&self) -> bool {
        self.0.abs() <= Self::MAX.0
    }

    #[must_use]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).and_then(Self::bounded)
    }

    #[must_use]
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).and_then(Self::bounded)
    }

    /// Line total for `quantity` units at this unit price.
    #[must_use]
    pub fn checked_times(self, quantity: i32) -> Option<Self> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .and_then(Self::bounded)
    }

    /// Sum of `amounts`, or `None` if any partial sum leaves the range.
    pub fn checked_sum<I: IntoIterator<Item = Self>>(amounts: I) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, Self::checked_add)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyRangeError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::bounded(amount).ok_or(MoneyRangeError(amount))
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_times_and_sum() {
        let price = Money::from_cents(500);
        assert_eq!(price.checked_times(2), Some(Money::from_cents(1000)));

        let total = Money::checked_sum([Money::from_cents(1000), Money::from_cents(250)]);
        assert_eq!(total, Some(Money::from_cents(1250)));
    }

    #[test]
    fn test_new_rounds_to_cents() {
        let m = Money::new(Decimal::new(19_995, 3));
        assert_eq!(m.to_string(), "20.00");
    }

    #[test]
    fn test_is_negative_ignores_negative_zero() {
        assert!(!Money::ZERO.is_negative());
        assert!(Money::ZERO.checked_sub(Money::from_cents(1)).unwrap().is_negative());
    }

    #[test]
    fn test_max_matches_column_range() {
        assert_eq!(Money::MAX.to_string(), "99999999.99");
        assert!(Money::MAX.is_in_range());
        assert!(!Money::new(Decimal::new(10_000_000_000, 2)).is_in_range());
    }

    #[test]
    fn test_checked_ops_never_overflow() {
        let huge = Money::new(Decimal::MAX);
        assert_eq!(huge.checked_add(huge), None);
        assert_eq!(Money::MAX.checked_add(Money::from_cents(1)), None);
        assert_eq!(Money::ZERO.checked_sub(huge), None);
        assert_eq!(Money::MAX.checked_times(2), None);
        assert_eq!(huge.checked_times(i32::MAX), None);
        assert_eq!(Money::checked_sum([Money::MAX, Money::MAX]), None);
        assert_eq!(Money::MAX.checked_sub(Money::MAX), Some(Money::ZERO));
    }

    #[test]
    fn test_serde_is_a_decimal_string() {
        let json = serde_json::to_string(&Money::from_cents(1300)).unwrap();
        assert_eq!(json, "\"13.00\"");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Money::from_cents(1300));

        assert_eq!(serde_json::to_string(&Money::ZERO).unwrap(), "\"0.00\"");
        let whole: Money = serde_json::from_str("\"5\"").unwrap();
        assert_eq!(whole.to_string(), "5.00");
        assert_eq!(serde_json::to_string(&whole).unwrap(), "\"5.00\"");
    }

    #[test]
    fn test_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Money>("\"100000000.00\"").is_err());
        assert!(serde_json::from_str::<Money>("\"79228162514264337593543950335\"").is_err());
        assert!(serde_json::from_str::<Money>("\"99999999.99\"").is_ok());
    }
}
