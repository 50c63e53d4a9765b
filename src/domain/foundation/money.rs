//! Money value object: fixed-point amounts in minor units (centavos).
//!
//! Amounts are stored as `i64` minor units and never pass through floating
//! point. Decimal conversion happens only at wire boundaries (provider JSON,
//! plan catalog) via `rust_decimal`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Supported currencies.
///
/// The platform bills in BRL; USD exists for the occasional international
/// tenant and to keep cross-currency arithmetic an explicit error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    #[serde(rename = "BRL")]
    Brl,
    #[serde(rename = "USD")]
    Usd,
}

impl Currency {
    /// Returns the ISO 4217 code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Brl => "BRL",
            Currency::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BRL" => Ok(Currency::Brl),
            "USD" => Ok(Currency::Usd),
            _ => Err(MoneyError::UnknownCurrency(s.to_string())),
        }
    }
}

/// Errors from money construction and arithmetic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MoneyError {
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    #[error("Amount arithmetic overflowed")]
    Overflow,

    #[error("Amount {0} has sub-centavo precision")]
    SubcentPrecision(Decimal),

    #[error("Cannot parse '{0}' as a decimal amount")]
    Unparseable(String),

    #[error("Unknown currency code '{0}'")]
    UnknownCurrency(String),

    #[error("Pro-ration denominator must be positive, got {0}")]
    InvalidRatio(i64),
}

/// Fixed-point monetary amount.
///
/// Equality and ordering are defined on (amount, currency); arithmetic across
/// currencies fails with [`MoneyError::CurrencyMismatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: i64,
    currency: Currency,
}

impl Money {
    /// Creates a money value from minor units (centavos for BRL).
    pub fn from_minor_units(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Convenience constructor for BRL centavos.
    pub fn brl(centavos: i64) -> Self {
        Self::from_minor_units(centavos, Currency::Brl)
    }

    /// Zero in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self::from_minor_units(0, currency)
    }

    /// Creates a money value from a decimal amount (e.g. `99.90`).
    ///
    /// Fails if the decimal carries more precision than minor units.
    pub fn from_decimal(value: Decimal, currency: Currency) -> Result<Self, MoneyError> {
        let scaled = value
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(MoneyError::Overflow)?;
        if scaled.fract() != Decimal::ZERO {
            return Err(MoneyError::SubcentPrecision(value));
        }
        let amount = scaled.to_i64().ok_or(MoneyError::Overflow)?;
        Ok(Self { amount, currency })
    }

    /// Parses a decimal string (e.g. `"99.90"`) into a money value.
    pub fn parse(s: &str, currency: Currency) -> Result<Self, MoneyError> {
        let value = Decimal::from_str(s).map_err(|_| MoneyError::Unparseable(s.to_string()))?;
        Self::from_decimal(value, currency)
    }

    /// Returns the amount in minor units.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Returns the currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns the amount as a two-decimal value for wire serialization.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.amount, 2)
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn is_positive(&self) -> bool {
        self.amount > 0
    }

    /// Adds two amounts of the same currency.
    pub fn checked_add(self, other: Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self { amount, ..self })
    }

    /// Subtracts an amount of the same currency.
    pub fn checked_sub(self, other: Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self { amount, ..self })
    }

    /// Subtracts a credit, flooring the result at zero.
    ///
    /// Used when applying pro-ration credit against a new plan price: the
    /// credit never produces a negative charge.
    pub fn sub_or_zero(self, credit: Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(credit)?;
        let amount = self.amount.saturating_sub(credit.amount).max(0);
        Ok(Self { amount, ..self })
    }

    /// Scales the amount by `numerator / denominator`, truncating toward zero.
    ///
    /// Pro-ration credit for unused time is `price.prorated(remaining_days,
    /// period_days)`.
    pub fn prorated(self, numerator: i64, denominator: i64) -> Result<Money, MoneyError> {
        if denominator <= 0 {
            return Err(MoneyError::InvalidRatio(denominator));
        }
        let scaled = (self.amount as i128 * numerator as i128) / denominator as i128;
        let amount = i64::try_from(scaled).map_err(|_| MoneyError::Overflow)?;
        Ok(Self { amount, ..self })
    }

    fn ensure_same_currency(&self, other: Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.amount < 0 { "-" } else { "" };
        let abs = self.amount.unsigned_abs();
        let (units, cents) = (abs / 100, abs % 100);
        match self.currency {
            Currency::Brl => write!(f, "{}R$ {},{:02}", sign, units, cents),
            Currency::Usd => write!(f, "{}US$ {}.{:02}", sign, units, cents),
        }
    }
}
