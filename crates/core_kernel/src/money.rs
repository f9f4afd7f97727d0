//! Money types with integer minor-unit arithmetic
//!
//! Commission and wallet amounts are stored as whole minor units (sen, cents)
//! so that repeated postings never accumulate floating-point drift. Percentage
//! rates are applied with `rust_decimal` and rounded half-up to the nearest
//! minor unit.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;
use thiserror::Error;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    MYR,
    SGD,
    USD,
    EUR,
    JPY,
}

impl Currency {
    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Returns the currency symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::MYR => "RM",
            Currency::SGD => "S$",
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::JPY => "¥",
        }
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::MYR => "MYR",
            Currency::SGD => "SGD",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::JPY => "JPY",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MYR" => Ok(Currency::MYR),
            "SGD" => Ok(Currency::SGD),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "JPY" => Ok(Currency::JPY),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: cannot operate on {0} and {1}")]
    CurrencyMismatch(String, String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount in integer minor units with its currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    minor: i64,
    currency: Currency,
}

impl Money {
    /// Creates Money from an integer amount in minor units (e.g., sen)
    pub fn from_minor(minor_units: i64, currency: Currency) -> Self {
        Self {
            minor: minor_units,
            currency,
        }
    }

    /// Creates Money from a major-unit decimal, rounding half-up to the minor unit
    pub fn from_major(amount: Decimal, currency: Currency) -> Result<Self, MoneyError> {
        let scale = Decimal::from(10_i64.pow(currency.decimal_places()));
        let minor = amount
            .checked_mul(scale)
            .ok_or(MoneyError::Overflow)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor(minor, currency))
    }

    /// Creates a zero amount in the specified currency
    pub fn zero(currency: Currency) -> Self {
        Self { minor: 0, currency }
    }

    /// Returns the amount in minor units
    pub fn minor_units(&self) -> i64 {
        self.minor
    }

    /// Returns the amount in major units as a decimal
    pub fn amount(&self) -> Decimal {
        Decimal::new(self.minor, self.currency.decimal_places())
    }

    /// Returns the currency
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Returns true if the amount is positive
    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.minor < 0
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Self {
        Self {
            minor: self.minor.saturating_abs(),
            currency: self.currency,
        }
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        Ok(())
    }

    /// Checked addition that returns an error on currency mismatch or overflow
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let minor = self.minor.checked_add(other.minor).ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor(minor, self.currency))
    }

    /// Checked subtraction that returns an error on currency mismatch or overflow
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let minor = self.minor.checked_sub(other.minor).ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor(minor, self.currency))
    }

    /// Sums an iterator of amounts, all of which must share `currency`
    pub fn sum<'a>(
        currency: Currency,
        amounts: impl IntoIterator<Item = &'a Money>,
    ) -> Result<Money, MoneyError> {
        amounts
            .into_iter()
            .try_fold(Money::zero(currency), |acc, m| acc.checked_add(m))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = self.currency.decimal_places();
        write!(
            f,
            "{} {:.dp$}",
            self.currency.symbol(),
            self.amount(),
            dp = dp as usize
        )
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self::from_minor(self.minor.saturating_neg(), self.currency)
    }
}

/// A commission percentage between 0 and 100 inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    /// The rate as a percentage (e.g., 10 for 10%)
    percentage: Decimal,
}

impl Rate {
    /// Creates a rate from a percentage (e.g., 5.0 for 5%)
    pub fn from_percentage(percentage: Decimal) -> Result<Self, MoneyError> {
        if percentage < Decimal::ZERO || percentage > dec!(100) {
            return Err(MoneyError::InvalidRate(format!(
                "percentage {} is outside 0..=100",
                percentage
            )));
        }
        Ok(Self { percentage })
    }

    /// Returns the rate as a percentage
    pub fn as_percentage(&self) -> Decimal {
        self.percentage
    }

    /// Returns the rate as a fraction (e.g., 0.05 for 5%)
    pub fn as_decimal(&self) -> Decimal {
        self.percentage / dec!(100)
    }

    /// Applies this rate to a money amount
    ///
    /// Computes `percentage * basis / 100` and rounds half-up to the nearest
    /// minor unit.
    pub fn apply(&self, basis: &Money) -> Result<Money, MoneyError> {
        let minor = Decimal::from(basis.minor_units())
            .checked_mul(self.percentage)
            .ok_or(MoneyError::Overflow)?
            .checked_div(dec!(100))
            .ok_or(MoneyError::Overflow)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::from_minor(minor, basis.currency()))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percentage.normalize())
    }
}
