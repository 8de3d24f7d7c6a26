//! Value objects for the POS core

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() {
            return Err(SkuError::Empty);
        }
        if value.len() > 100 {
            return Err(SkuError::TooLong);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Error)]
pub enum SkuError {
    #[error("SKU empty")]
    Empty,
    #[error("SKU too long")]
    TooLong,
}

/// Money value object. Amounts are fixed-point decimals; every derived
/// monetary figure is rounded to 2 decimal places, half-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self {
        Self { amount, currency: currency.to_string() }
    }

    pub fn ngn(amount: Decimal) -> Self {
        Self::new(amount, "NGN")
    }

    pub fn zero(currency: &str) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.check_currency(other)?;
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }

    /// Difference floored at zero. Insufficient tender reports zero change,
    /// never a negative amount.
    pub fn saturating_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.check_currency(other)?;
        let diff = self.amount - other.amount;
        Ok(Money::new(diff.max(Decimal::ZERO), &self.currency))
    }

    pub fn multiply(&self, qty: u32) -> Money {
        Money::new(self.amount * Decimal::from(qty), &self.currency)
    }

    /// Round to 2 decimal places, half-up.
    pub fn rounded(&self) -> Money {
        Money::new(
            self.amount
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            &self.currency,
        )
    }

    pub fn covers(&self, other: &Money) -> Result<bool, MoneyError> {
        self.check_currency(other)?;
        Ok(self.amount >= other.amount)
    }

    fn check_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch);
        }
        Ok(())
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero("NGN")
    }
}

#[derive(Debug, Clone, Error)]
pub enum MoneyError {
    #[error("Currency mismatch")]
    CurrencyMismatch,
}

/// Tax rate expressed as a percentage (e.g. 5.00 for 5%).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(Decimal);

impl TaxRate {
    pub fn percent(value: Decimal) -> Self {
        Self(value)
    }

    pub fn as_percent(&self) -> Decimal {
        self.0
    }

    /// Tax owed on the given amount, rounded to 2 decimal places half-up.
    pub fn apply(&self, base: &Money) -> Money {
        Money::new(base.amount() * self.0 / Decimal::from(100), base.currency()).rounded()
    }
}

/// Quantity value object
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn add(&self, other: u32) -> Self {
        Self(self.0.saturating_add(other))
    }

    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 {
            None
        } else {
            Some(Self(self.0 - other))
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sku_normalized() {
        let sku = Sku::new("prd-rd-l ").unwrap();
        assert_eq!(sku.as_str(), "PRD-RD-L");
    }

    #[test]
    fn test_money_add() {
        let a = Money::ngn(dec!(100));
        let b = Money::ngn(dec!(50));
        assert_eq!(a.add(&b).unwrap().amount(), dec!(150));
    }

    #[test]
    fn test_money_saturating_sub_floors_at_zero() {
        let total = Money::ngn(dec!(3675.00));
        let cash = Money::ngn(dec!(3000.00));
        assert_eq!(cash.saturating_sub(&total).unwrap().amount(), dec!(0));
    }

    #[test]
    fn test_currency_mismatch() {
        let a = Money::ngn(dec!(10));
        let b = Money::new(dec!(10), "USD");
        assert!(a.add(&b).is_err());
    }

    #[test]
    fn test_tax_rounds_half_up() {
        // 5% of 10.50 = 0.525, which rounds to 0.53
        let rate = TaxRate::percent(dec!(5.00));
        assert_eq!(rate.apply(&Money::ngn(dec!(10.50))).amount(), dec!(0.53));
        assert_eq!(rate.apply(&Money::ngn(dec!(3500))).amount(), dec!(175.00));
    }

    #[test]
    fn test_quantity_subtract() {
        let q = Quantity::new(5);
        assert_eq!(q.subtract(3).unwrap().value(), 2);
        assert!(q.subtract(6).is_none());
    }
}
