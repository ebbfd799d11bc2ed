//! Decimal quantities and percentage rates used by line items.

use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Count of units on a line (whole or fractional, e.g. `2` or `1.5` hours).
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl ValueObject for Quantity {}

impl Quantity {
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn units(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl FromStr for Quantity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .map(Self)
            .map_err(|_| DomainError::validation(format!("'{}' is not a valid quantity", s.trim())))
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0.normalize(), f)
    }
}

/// Tax rate as a percentage (`10` means 10%).
///
/// Bounds are checked by the owner of the rate (line items, company settings) so
/// that each can report its own error kind.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaxRate(Decimal);

impl ValueObject for TaxRate {}

impl TaxRate {
    pub const ZERO: TaxRate = TaxRate(Decimal::ZERO);

    pub fn percent(value: Decimal) -> Self {
        Self(value)
    }

    pub fn whole_percent(value: i64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn as_percent(self) -> Decimal {
        self.0
    }

    /// `rate / 100`.
    pub fn fraction(self) -> Decimal {
        self.0 / Decimal::ONE_HUNDRED
    }

    pub fn is_within_bounds(self) -> bool {
        self.0 >= Decimal::ZERO && self.0 <= Decimal::ONE_HUNDRED
    }

    /// Bounds check reported as a plain validation error.
    pub fn ensure_within_bounds(self) -> DomainResult<Self> {
        if !self.is_within_bounds() {
            return Err(DomainError::validation(format!(
                "tax rate {} must be between 0 and 100",
                self.0
            )));
        }
        Ok(self)
    }
}

impl FromStr for TaxRate {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .map(Self)
            .map_err(|_| DomainError::validation(format!("'{}' is not a valid tax rate", s.trim())))
    }
}

impl core::fmt::Display for TaxRate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0.normalize())
    }
}
