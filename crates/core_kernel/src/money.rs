//! Monetary amounts and percentages
//!
//! Every monetary field in a claim is an integer count of minor currency
//! units. Percentages are decimals and are applied as
//! `floor(amount * percent / 100)` so that results stay integral without any
//! floating-point step.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur during money operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid bounds: minimum {min} exceeds maximum {max}")]
    InvalidBounds { min: i64, max: i64 },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Overflow during calculation")]
    Overflow,
}

/// An amount of money in minor currency units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn new(minor_units: i64) -> Self {
        Self(minor_units)
    }

    pub fn zero() -> Self {
        Self::ZERO
    }

    /// Returns the raw minor-unit count
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(&self, other: Amount) -> Result<Amount, MoneyError> {
        self.0.checked_add(other.0).map(Amount).ok_or(MoneyError::Overflow)
    }

    pub fn checked_sub(&self, other: Amount) -> Result<Amount, MoneyError> {
        self.0.checked_sub(other.0).map(Amount).ok_or(MoneyError::Overflow)
    }

    /// Subtraction that stops at zero, used for remaining-limit style fields
    pub fn saturating_sub_floor_zero(&self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0).max(0))
    }

    /// Clamps the amount into `[min, max]`, rejecting inverted bounds
    pub fn clamp_checked(&self, min: Amount, max: Amount) -> Result<Amount, MoneyError> {
        if min > max {
            return Err(MoneyError::InvalidBounds { min: min.0, max: max.0 });
        }
        Ok(Amount(self.0.clamp(min.0, max.0)))
    }

    pub fn as_decimal(&self) -> Decimal {
        Decimal::from(self.0)
    }

    /// Converts a decimal back into minor units, rounding toward negative infinity
    pub fn from_decimal_floor(value: Decimal) -> Result<Amount, MoneyError> {
        value.floor().to_i64().map(Amount).ok_or(MoneyError::Overflow)
    }
}

impl From<i64> for Amount {
    fn from(minor_units: i64) -> Self {
        Amount(minor_units)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A percentage such as a coverage rate, stored as `80` for 80%
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percent(Decimal);

impl Percent {
    pub fn new(value: Decimal) -> Self {
        Self(value.normalize())
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn hundred() -> Self {
        Self(dec!(100))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Returns `100 - self`, e.g. the franchise share of a coverage rate
    pub fn complement(&self) -> Percent {
        Percent::new(dec!(100) - self.0)
    }

    /// Clamps into `[min, max]`; an inverted range yields `min`
    pub fn clamp_within(&self, min: Percent, max: Percent) -> Percent {
        if self.0 < min.0 {
            min
        } else if self.0 > max.0 {
            max
        } else {
            *self
        }
    }

    /// Applies the percentage to an amount: `floor(amount * percent / 100)`
    pub fn apply(&self, amount: Amount) -> Result<Amount, MoneyError> {
        let scaled = amount
            .as_decimal()
            .checked_mul(self.0)
            .ok_or(MoneyError::Overflow)?;
        let share = scaled.checked_div(dec!(100)).ok_or(MoneyError::Overflow)?;
        Amount::from_decimal_floor(share)
    }

    /// Applies the percentage, then clamps the share into `[min, max]`.
    ///
    /// The result never exceeds `base` and never goes below zero, whatever the
    /// configured bounds say.
    pub fn apply_bounded(
        &self,
        base: Amount,
        min: Amount,
        max: Amount,
    ) -> Result<Amount, MoneyError> {
        let share = self.apply(base)?.clamp_checked(min, max)?;
        let ceiling = base.0.max(0);
        Ok(Amount(share.0.clamp(0, ceiling)))
    }
}

impl From<Decimal> for Percent {
    fn from(value: Decimal) -> Self {
        Percent::new(value)
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}
