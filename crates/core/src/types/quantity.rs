//! Non-negative unit counts for inventory quantities and warehouse capacities.

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// The value is below zero.
    #[error("quantity must be non-negative (got {0})")]
    Negative(i64),
    /// The value does not fit the store's `INTEGER` column.
    #[error("quantity must be at most {max} (got {value})")]
    TooLarge {
        /// Offending value.
        value: i64,
        /// Largest storable quantity.
        max: u32,
    },
}

/// A non-negative count of units.
///
/// Bounded by `i32::MAX` so every value round-trips through a Postgres
/// `INTEGER` column. Sums of quantities are computed as `u64` and never
/// overflow.
///
/// ```
/// use depot_core::Quantity;
///
/// assert_eq!(Quantity::try_from(6_i64).unwrap().get(), 6);
/// assert!(Quantity::try_from(-1_i64).is_err());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Zero units.
    pub const ZERO: Self = Self(0);

    /// Largest representable quantity.
    #[allow(clippy::cast_sign_loss)] // i32::MAX is positive
    pub const MAX: u32 = i32::MAX as u32;

    /// Number of units.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Number of units as a widened sum operand.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0 as u64
    }

    /// Number of units as the store's column type.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)] // bounded by Self::MAX
    pub const fn as_i32(self) -> i32 {
        self.0 as i32
    }

    /// Add two quantities, failing if the result is not storable.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::TooLarge`] if the sum exceeds [`Self::MAX`].
    pub fn checked_add(self, other: Self) -> Result<Self, QuantityError> {
        Self::try_from(i64::from(self.0) + i64::from(other.0))
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            return Err(QuantityError::Negative(value));
        }
        u32::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX)
            .map(Self)
            .ok_or(QuantityError::TooLarge {
                value,
                max: Self::MAX,
            })
    }
}

impl TryFrom<i32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(value))
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(value))
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert_eq!(Quantity::try_from(0_i64).unwrap(), Quantity::ZERO);
        assert_eq!(Quantity::try_from(-5_i64), Err(QuantityError::Negative(-5)));
        assert!(matches!(
            Quantity::try_from(i64::from(i32::MAX) + 1),
            Err(QuantityError::TooLarge { .. })
        ));
        assert_eq!(
            Quantity::try_from(i32::MAX).unwrap().as_i32(),
            i32::MAX
        );
    }

    #[test]
    fn test_checked_add() {
        let six = Quantity::try_from(6_i64).unwrap();
        assert_eq!(six.checked_add(six).unwrap().get(), 12);

        let max = Quantity::try_from(i64::from(Quantity::MAX)).unwrap();
        assert!(max.checked_add(six).is_err());
    }

    #[test]
    fn test_deserialize_rejects_negative() {
        assert!(serde_json::from_str::<Quantity>("-1").is_err());
        assert_eq!(serde_json::from_str::<Quantity>("3").unwrap().get(), 3);
    }
}
