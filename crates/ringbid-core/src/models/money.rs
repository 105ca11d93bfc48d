//! Money model
//!
//! Currency-tagged exact decimal values. Every monetary amount in the
//! exchange is a [`Money`]; arithmetic between two values with different
//! currencies fails with `CurrencyMismatch` instead of silently mixing.
//! There is no floating-point constructor: amounts enter the system as
//! `rust_decimal::Decimal` only.

use crate::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// ISO 4217 currency code (three ASCII uppercase letters)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const USD: Currency = Currency(*b"USD");
    pub const EUR: Currency = Currency(*b"EUR");

    /// Parse a currency code, normalizing to uppercase
    pub fn new(code: &str) -> AppResult<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_alphabetic()) {
            return Err(AppError::InvalidInput(format!(
                "invalid currency code: {code}"
            )));
        }
        let mut out = [0u8; 3];
        for (i, b) in bytes.iter().enumerate() {
            out[i] = b.to_ascii_uppercase();
        }
        Ok(Currency(out))
    }

    pub fn as_str(&self) -> &str {
        // constructed from validated ASCII
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for Currency {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.as_str().to_string()
    }
}

/// An exact monetary value tagged with its currency
///
/// `Money` is the only monetary representation accepted at any persisted
/// boundary. All arithmetic is checked: operations on mismatched
/// currencies return `CurrencyMismatch`, and overflow returns an
/// `Internal` error rather than wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Negate the amount, keeping the currency
    pub fn negated(&self) -> Self {
        Self {
            amount: -self.amount,
            currency: self.currency,
        }
    }

    /// Absolute value, keeping the currency
    pub fn abs(&self) -> Self {
        Self {
            amount: self.amount.abs(),
            currency: self.currency,
        }
    }

    fn require_same_currency(&self, other: &Money) -> AppResult<()> {
        if self.currency != other.currency {
            return Err(AppError::CurrencyMismatch {
                left: self.currency.to_string(),
                right: other.currency.to_string(),
            });
        }
        Ok(())
    }

    /// Checked addition; fails on currency mismatch or overflow
    pub fn checked_add(&self, other: &Money) -> AppResult<Money> {
        self.require_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| AppError::Internal("money addition overflow".to_string()))?;
        Ok(Money::new(amount, self.currency))
    }

    /// Checked subtraction; fails on currency mismatch or overflow
    pub fn checked_sub(&self, other: &Money) -> AppResult<Money> {
        self.require_same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or_else(|| AppError::Internal("money subtraction overflow".to_string()))?;
        Ok(Money::new(amount, self.currency))
    }

    /// Compare two values of the same currency
    pub fn try_cmp(&self, other: &Money) -> AppResult<Ordering> {
        self.require_same_currency(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    /// `self < other`, same-currency only
    pub fn try_lt(&self, other: &Money) -> AppResult<bool> {
        Ok(self.try_cmp(other)? == Ordering::Less)
    }

    /// `self >= other`, same-currency only
    pub fn try_ge(&self, other: &Money) -> AppResult<bool> {
        Ok(self.try_cmp(other)? != Ordering::Less)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}
