//! Money types with precise decimal arithmetic
//!
//! Amounts are held as `rust_decimal::Decimal` so quote amounts and gateway
//! callbacks compare exactly. Currencies cover the ones the condominium
//! gateways settle in (CLP, ARS, MXN, BRL, ...), plus USD and EUR.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    CLP,
    ARS,
    MXN,
    BRL,
    COP,
    PEN,
    UYU,
    USD,
    EUR,
}

impl Currency {
    /// Number of minor-unit decimal places used by the gateways
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::CLP => 0,
            _ => 2,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::CLP => "CLP$",
            Currency::ARS => "AR$",
            Currency::MXN => "MX$",
            Currency::BRL => "R$",
            Currency::COP => "COL$",
            Currency::PEN => "S/",
            Currency::UYU => "$U",
            Currency::USD => "US$",
            Currency::EUR => "€",
        }
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::CLP => "CLP",
            Currency::ARS => "ARS",
            Currency::MXN => "MXN",
            Currency::BRL => "BRL",
            Currency::COP => "COP",
            Currency::PEN => "PEN",
            Currency::UYU => "UYU",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CLP" => Ok(Currency::CLP),
            "ARS" => Ok(Currency::ARS),
            "MXN" => Ok(Currency::MXN),
            "BRL" => Ok(Currency::BRL),
            "COP" => Ok(Currency::COP),
            "PEN" => Ok(Currency::PEN),
            "UYU" => Ok(Currency::UYU),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            other => Err(MoneyError::UnsupportedCurrency(other.to_string())),
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

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount with associated currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Creates a new Money value, rounded to the currency's precision
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: amount.round_dp(currency.decimal_places()),
            currency,
        }
    }

    /// Creates Money from an integer amount in minor units (e.g., cents)
    pub fn from_minor(minor_units: i64, currency: Currency) -> Self {
        Self::new(Decimal::new(minor_units, currency.decimal_places()), currency)
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Amount in minor units, as card processors such as Stripe expect it
    pub fn to_minor(&self) -> Result<i64, MoneyError> {
        let scale = Decimal::from(10_i64.pow(self.currency.decimal_places()));
        let minor = self
            .amount
            .checked_mul(scale)
            .ok_or(MoneyError::Overflow)?
            .round();
        i64::try_from(minor).map_err(|_| MoneyError::Overflow)
    }

    /// Checked addition that returns an error on currency mismatch
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let sum = self.amount.checked_add(other.amount).ok_or(MoneyError::Overflow)?;
        Ok(Self::new(sum, self.currency))
    }

    /// Checked subtraction that returns an error on currency mismatch
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let diff = self.amount.checked_sub(other.amount).ok_or(MoneyError::Overflow)?;
        Ok(Self::new(diff, self.currency))
    }

    /// True when both values carry the same currency and amount once rounded
    /// to the currency's precision
    pub fn matches(&self, other: &Money) -> bool {
        self.currency == other.currency
            && self.amount.round_dp(self.currency.decimal_places())
                == other.amount.round_dp(other.currency.decimal_places())
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
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = self.currency.decimal_places() as usize;
        write!(f, "{} {:.dp$}", self.currency.symbol(), self.amount, dp = dp)
    }
}
