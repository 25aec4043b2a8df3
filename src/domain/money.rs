use crate::error::BillingError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Neg, Sub};

/// A signed monetary value.
///
/// Ledger balances go negative when a tenant is in credit, so unlike
/// [`Amount`] this type accepts any decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(pub Decimal);

/// A strictly positive monetary amount, used for charges and payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, BillingError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(BillingError::validation("Amount must be positive"))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Rounds up to whole currency units. Mobile-money prompts only take integers.
    pub fn ceil_whole(&self) -> Self {
        Self(self.0.ceil())
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = BillingError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Money {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Clamps negative values (credit) to zero.
    pub fn non_negative(self) -> Self {
        self.max(Self::ZERO)
    }

    /// Rounds to cents, half away from zero.
    pub fn round_cents(self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Sum of two values. Fails instead of overflowing.
    pub fn checked_add(self, rhs: Self) -> Result<Self, BillingError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or_else(|| BillingError::validation(format!("Monetary amount out of range: {self} + {rhs}")))
    }

    /// Converts a positive balance into an [`Amount`], `None` otherwise.
    pub fn to_amount(self) -> Option<Amount> {
        Amount::new(self.0).ok()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_arithmetic() {
        let a = Money::new(dec!(10.0));
        let b = Money::new(dec!(25.5));
        assert_eq!(a.checked_add(b).unwrap(), Money::new(dec!(35.5)));
        assert_eq!(a - b, Money::new(dec!(-15.5)));
        assert_eq!(-a, Money::new(dec!(-10.0)));
    }

    #[test]
    fn test_addition_overflow_is_an_error() {
        let huge = Money::new(Decimal::MAX);
        assert!(matches!(
            huge.checked_add(Money::new(dec!(1))),
            Err(BillingError::Validation(_))
        ));
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(0.01)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(BillingError::Validation(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-3.0)),
            Err(BillingError::Validation(_))
        ));
    }

    #[test]
    fn test_amount_rounds_up_to_whole_units() {
        let amount = Amount::new(dec!(1500.01)).unwrap();
        assert_eq!(amount.ceil_whole().value(), dec!(1501));

        let whole = Amount::new(dec!(1500)).unwrap();
        assert_eq!(whole.ceil_whole().value(), dec!(1500));
    }

    #[test]
    fn test_money_round_cents() {
        assert_eq!(Money::new(dec!(2.345)).round_cents(), Money::new(dec!(2.35)));
        assert_eq!(Money::new(dec!(-2.345)).round_cents(), Money::new(dec!(-2.35)));
    }

    #[test]
    fn test_credit_is_not_an_amount() {
        assert!(Money::new(dec!(-50)).to_amount().is_none());
        assert_eq!(Money::new(dec!(-50)).non_negative(), Money::ZERO);
    }

    #[test]
    fn test_amount_rejects_zero_on_deserialize() {
        let parsed: Result<Amount, _> = serde_json::from_str("0");
        assert!(parsed.is_err());
        let parsed: Amount = serde_json::from_str("12.5").unwrap();
        assert_eq!(parsed.value(), dec!(12.5));
    }
}
