//! Human-legible order numbers.
//!
//! Format: `ORD-` followed by ten characters of the Crockford base-32
//! alphabet, which omits `I`, `L`, `O` and `U` so numbers survive being read
//! aloud over the phone. Generation lives with the caller that owns an RNG;
//! this module only encodes and validates.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Crockford base-32 alphabet.
pub const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

const PREFIX: &str = "ORD-";
const BODY_LEN: usize = 10;

/// Errors that can occur when parsing an [`OrderNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderNumberError {
    #[error("order number must start with {PREFIX}")]
    MissingPrefix,
    #[error("order number must have {BODY_LEN} characters after the prefix")]
    WrongLength,
    #[error("order number contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// A validated order number such as `ORD-7K2M9Q4XRD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Encode ten 5-bit symbols taken from the low 50 bits of `entropy`.
    #[must_use]
    pub fn from_entropy(entropy: u64) -> Self {
        let mut s = String::with_capacity(PREFIX.len() + BODY_LEN);
        s.push_str(PREFIX);
        for i in (0..BODY_LEN).rev() {
            let idx = (entropy >> (i * 5)) & 0x1f;
            // idx < 32 by the mask
            #[allow(clippy::cast_possible_truncation)]
            s.push(char::from(ALPHABET[idx as usize]));
        }
        Self(s)
    }

    /// Parse an order number.
    ///
    /// # Errors
    ///
    /// Returns an [`OrderNumberError`] if the prefix, length or alphabet is
    /// wrong.
    pub fn parse(s: &str) -> Result<Self, OrderNumberError> {
        let body = s
            .strip_prefix(PREFIX)
            .ok_or(OrderNumberError::MissingPrefix)?;
        if body.chars().count() != BODY_LEN {
            return Err(OrderNumberError::WrongLength);
        }
        if let Some(bad) = body.chars().find(|c| !c.is_ascii() || !ALPHABET.contains(&(*c as u8))) {
            return Err(OrderNumberError::InvalidCharacter(bad));
        }
        Ok(Self(s.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OrderNumber {
    type Err = OrderNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = OrderNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(n: OrderNumber) -> Self {
        n.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for OrderNumber {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OrderNumber {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for OrderNumber {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_entropy_is_parseable() {
        for entropy in [0, 1, u64::MAX, 0x0123_4567_89ab_cdef] {
            let n = OrderNumber::from_entropy(entropy);
            assert_eq!(n.as_str().len(), 14);
            assert_eq!(OrderNumber::parse(n.as_str()).unwrap(), n);
        }
        assert_eq!(OrderNumber::from_entropy(0).as_str(), "ORD-0000000000");
        assert_eq!(OrderNumber::from_entropy(31).as_str(), "ORD-000000000Z");
    }

    #[test]
    fn test_parse_rejects() {
        assert_eq!(
            OrderNumber::parse("ABC-0000000000"),
            Err(OrderNumberError::MissingPrefix)
        );
        assert_eq!(
            OrderNumber::parse("ORD-000"),
            Err(OrderNumberError::WrongLength)
        );
        assert_eq!(
            OrderNumber::parse("ORD-00000000OL"),
            Err(OrderNumberError::InvalidCharacter('O'))
        );
    }
}
