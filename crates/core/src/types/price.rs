//! Type-safe price representation using decimal arithmetic.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative")]
    Negative,
    /// The amount doesn't fit a `NUMERIC(12, 2)` column.
    #[error("price cannot exceed {}", Price::MAX)]
    TooLarge,
    /// The input could not be parsed as a decimal number.
    #[error("price is not a valid number: {0}")]
    Invalid(String),
}

/// A non-negative monetary amount in the store currency.
///
/// Amounts are rounded half-away-from-zero to two decimal places, matching
/// the `NUMERIC(12, 2)` columns they are stored in.
///
/// ```
/// use marketplace_core::Price;
/// use rust_decimal::Decimal;
///
/// let price = Price::parse("19.999").unwrap();
/// assert_eq!(price.to_string(), "20.00");
/// assert_eq!(price.line_total(3).amount(), Decimal::new(6000, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// A price of zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Largest storable amount, `9999999999.99`.
    pub const MAX: Self = Self(Decimal::from_parts(3_567_587_327, 232, 0, false, 2));

    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` for amounts below zero and
    /// `PriceError::TooLarge` for amounts above [`Price::MAX`].
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        let rounded = round_cents(amount);
        if rounded > Self::MAX.0 {
            return Err(PriceError::TooLarge);
        }
        Ok(Self(rounded))
    }

    /// Parse a price from its decimal string form (e.g. form fields).
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Invalid` if the string is not a number, and the
    /// errors of [`Price::new`] otherwise.
    pub fn parse(s: &str) -> Result<Self, PriceError> {
        let amount = s
            .trim()
            .parse::<Decimal>()
            .map_err(|e| PriceError::Invalid(e.to_string()))?;
        Self::new(amount)
    }

    /// The underlying amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units. May exceed [`Price::MAX`].
    #[must_use]
    pub fn line_total(&self, quantity: u32) -> Self {
        Self(round_cents(self.0 * Decimal::from(quantity)))
    }
}

fn round_cents(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl std::iter::Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(round_cents(iter.map(|p| p.0).sum()))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Price {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Price {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Price {
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
    fn test_rejects_negative() {
        assert_eq!(Price::new(Decimal::new(-1, 2)), Err(PriceError::Negative));
        assert_eq!(Price::parse("-5"), Err(PriceError::Negative));
    }

    #[test]
    fn test_zero_is_allowed() {
        assert_eq!(Price::parse("0").unwrap(), Price::ZERO);
    }

    #[test]
    fn test_max_fits_storage() {
        assert_eq!(Price::MAX.to_string(), "9999999999.99");
        assert_eq!(Price::parse("9999999999.99").unwrap(), Price::MAX);
        assert_eq!(Price::parse("10000000000"), Err(PriceError::TooLarge));
        // Rounds up past the limit
        assert_eq!(Price::parse("9999999999.995"), Err(PriceError::TooLarge));
        assert!(serde_json::from_str::<Price>("\"10000000000.00\"").is_err());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(Price::parse("ten"), Err(PriceError::Invalid(_))));
    }

    #[test]
    fn test_rounds_to_cents() {
        assert_eq!(Price::parse("1.005").unwrap().to_string(), "1.01");
        assert_eq!(Price::parse("3").unwrap().to_string(), "3.00");
    }

    #[test]
    fn test_sum_of_line_totals() {
        let total: Price = [
            Price::parse("9.99").unwrap().line_total(2),
            Price::parse("0.50").unwrap().line_total(1),
        ]
        .into_iter()
        .sum();
        assert_eq!(total.to_string(), "20.48");
    }

    #[test]
    fn test_serde_uses_decimal_string() {
        let price = Price::parse("12.5").unwrap();
        assert_eq!(serde_json::to_string(&price).unwrap(), "\"12.50\"");
        let back: Price = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(back, price);
        assert!(serde_json::from_str::<Price>("\"-1\"").is_err());
    }
}
