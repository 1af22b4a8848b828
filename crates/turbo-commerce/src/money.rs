//! Money type for prices and discounts.
//!
//! Amounts are integers in the currency's smallest unit so rule arithmetic
//! never accumulates floating-point error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Currency {
    #[default]
    EUR,
    USD,
    GBP,
    CHF,
    JPY,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::EUR => "EUR",
            Currency::USD => "USD",
            Currency::GBP => "GBP",
            Currency::CHF => "CHF",
            Currency::JPY => "JPY",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::EUR => "\u{20ac}",
            Currency::USD => "$",
            Currency::GBP => "\u{00a3}",
            Currency::CHF => "CHF ",
            Currency::JPY => "\u{00a5}",
        }
    }

    /// Number of decimal places for this currency.
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_uppercase().as_str() {
            "EUR" => Some(Currency::EUR),
            "USD" => Some(Currency::USD),
            "GBP" => Some(Currency::GBP),
            "CHF" => Some(Currency::CHF),
            "JPY" => Some(Currency::JPY),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A monetary value with currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Money {
    /// Amount in the smallest currency unit.
    pub amount_cents: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount_cents: i64, currency: Currency) -> Self {
        Self {
            amount_cents,
            currency,
        }
    }

    /// ```
    /// use turbo_commerce::money::{Currency, Money};
    /// let price = Money::from_decimal(49.99, Currency::EUR);
    /// assert_eq!(price.amount_cents, 4999);
    /// ```
    pub fn from_decimal(amount: f64, currency: Currency) -> Self {
        let multiplier = 10_i64.pow(currency.decimal_places());
        Self::new((amount * multiplier as f64).round() as i64, currency)
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    pub fn is_zero(&self) -> bool {
        self.amount_cents == 0
    }

    pub fn to_decimal(&self) -> f64 {
        let divisor = 10_i64.pow(self.currency.decimal_places());
        self.amount_cents as f64 / divisor as f64
    }

    /// `percent` percent of this amount, rounded to the smallest unit.
    pub fn percentage(&self, percent: f64) -> Money {
        let amount = (self.amount_cents as f64 * percent / 100.0).round() as i64;
        Money::new(amount, self.currency)
    }

    /// Sum of two amounts, `None` on currency mismatch.
    pub fn checked_add(&self, other: &Money) -> Option<Money> {
        (self.currency == other.currency)
            .then(|| Money::new(self.amount_cents + other.amount_cents, self.currency))
    }

    /// Subtract `other`, never going below zero. `None` on currency mismatch.
    pub fn saturating_sub(&self, other: &Money) -> Option<Money> {
        (self.currency == other.currency)
            .then(|| Money::new((self.amount_cents - other.amount_cents).max(0), self.currency))
    }

    /// The smaller of two amounts in the same currency.
    pub fn min(self, other: Money) -> Money {
        if other.currency == self.currency && other.amount_cents < self.amount_cents {
            other
        } else {
            self
        }
    }

    pub fn multiply(&self, factor: i64) -> Money {
        Money::new(self.amount_cents * factor, self.currency)
    }

    /// Format with symbol, e.g. `"€49.99"`.
    pub fn display(&self) -> String {
        let places = self.currency.decimal_places() as usize;
        format!("{}{:.places$}", self.currency.symbol(), self.to_decimal())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_decimal() {
        assert_eq!(Money::from_decimal(49.99, Currency::EUR).amount_cents, 4999);
        assert_eq!(Money::from_decimal(100.0, Currency::JPY).amount_cents, 100);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::new(4999, Currency::USD).display(), "$49.99");
        assert_eq!(Money::new(100, Currency::JPY).display(), "\u{00a5}100");
    }

    #[test]
    fn test_money_percentage() {
        let m = Money::new(10000, Currency::EUR);
        assert_eq!(m.percentage(10.0).amount_cents, 1000);
        assert_eq!(Money::new(999, Currency::EUR).percentage(50.0).amount_cents, 500);
    }

    #[test]
    fn test_saturating_sub_floors_at_zero() {
        let a = Money::new(500, Currency::EUR);
        let b = Money::new(800, Currency::EUR);
        assert_eq!(a.saturating_sub(&b), Some(Money::zero(Currency::EUR)));
        assert_eq!(b.saturating_sub(&a).map(|m| m.amount_cents), Some(300));
    }

    #[test]
    fn test_currency_mismatch() {
        let eur = Money::new(1000, Currency::EUR);
        let usd = Money::new(1000, Currency::USD);
        assert_eq!(eur.checked_add(&usd), None);
        assert_eq!(eur.saturating_sub(&usd), None);
    }

    #[test]
    fn test_currency_from_code() {
        assert_eq!(Currency::from_code("usd"), Some(Currency::USD));
        assert_eq!(Currency::from_code("XXX"), None);
    }
}
