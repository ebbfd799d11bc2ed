//! Exact currency amounts.
//!
//! Every monetary value in the system is an integer count of the currency's
//! smallest unit (cents, paisas). Parsing from and rendering to major units goes
//! through `rust_decimal` so no binary floating point is ever involved.

use core::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Scaling factor between the major unit and the smallest unit.
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Number of decimal places of the major-unit representation.
const MINOR_SCALE: u32 = 2;

/// Amount of money in the smallest currency unit.
///
/// Signed so that transient balances (e.g. an overpaid invoice) are representable;
/// the layers that accept user input reject negative amounts where they are not
/// meaningful.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Convert a major-unit decimal (e.g. `12.505`) to the smallest unit,
    /// rounding half away from zero: `round(x * 100)`.
    pub fn from_major(major: Decimal) -> DomainResult<Self> {
        let scaled = major
            .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
            .ok_or_else(|| DomainError::invalid_amount(format!("{major} is out of range")))?;
        Self::from_decimal_minor(scaled)
    }

    /// Parse a human decimal string in major units (`"12.50"` -> 1250).
    pub fn from_major_str(input: &str) -> DomainResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_amount("amount is empty"));
        }
        let major = Decimal::from_str(trimmed)
            .map_err(|_| DomainError::invalid_amount(format!("'{trimmed}' is not a number")))?;
        Self::from_major(major)
    }

    /// Round a fractional smallest-unit amount (e.g. a computed tax of 12.5
    /// cents) half away from zero to a whole number of units.
    pub fn from_decimal_minor(minor: Decimal) -> DomainResult<Self> {
        minor
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Self)
            .ok_or_else(|| DomainError::invalid_amount(format!("{minor} is out of range")))
    }

    /// Value in major units with exactly two decimal places.
    pub fn to_major(self) -> Decimal {
        Decimal::new(self.0, MINOR_SCALE)
    }

    /// `"12.50"`, `"-0.05"`, `"0.00"`.
    pub fn to_major_string(self) -> String {
        self.to_major().to_string()
    }

    pub fn as_decimal(self) -> Decimal {
        Decimal::from(self.0)
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// Aggregation-only addition; clamps at the `i64` bounds.
    pub fn saturating_add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Reject negative amounts with an `InvalidAmount` naming the field.
    pub fn ensure_non_negative(self, field: &str) -> DomainResult<Self> {
        if self.is_negative() {
            return Err(DomainError::invalid_amount(format!("{field} cannot be negative")));
        }
        Ok(self)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_major_string())
    }
}

impl core::iter::Sum for Money {
    /// Saturates at the `i64` bounds (over 92 quadrillion major units).
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Money::saturating_add)
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_major_str(s)
    }
}

/// Presentation helper: `format_amount(Money::from_minor(123450), "PKR")` renders
/// `"PKR 1,234.50"`. Locale-specific symbols are left to the client.
pub fn format_amount(amount: Money, currency: &str) -> String {
    let abs = amount.minor().unsigned_abs();
    let whole = abs / MINOR_UNITS_PER_MAJOR as u64;
    let frac = abs % MINOR_UNITS_PER_MAJOR as u64;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount.is_negative() { "-" } else { "" };
    format!("{currency} {sign}{grouped}.{frac:02}")
}

/// Validate an ISO 4217 style code (`"pkr"` -> `"PKR"`).
pub fn normalize_currency_code(code: &str) -> DomainResult<String> {
    let trimmed = code.trim();
    if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DomainError::validation(format!(
            "'{trimmed}' is not a three-letter currency code"
        )));
    }
    Ok(trimmed.to_ascii_uppercase())
}
