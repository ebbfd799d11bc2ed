//! Line-item calculator.
//!
//! A line's subtotal and tax are computed from exact decimals and each rounded
//! half-up to the smallest currency unit at the line level. Tax is charged on the
//! pre-discount subtotal; the absolute discount is subtracted last.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use invoicekit_core::{DomainError, DomainResult, Money, Quantity, TaxRate};
use invoicekit_products::ProductId;

/// One priced row on an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub title: String,
    /// Catalog product the line was picked from, if any. Name and price are copied.
    pub product_id: Option<ProductId>,
    pub quantity: Quantity,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: Money,
    pub tax_rate: TaxRate,
    /// Absolute amount subtracted from the line, not a rate.
    pub discount: Money,
}

/// A line's contribution to invoice totals, all in smallest units.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAmounts {
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
}

impl LineItem {
    pub fn calculate(&self) -> DomainResult<LineAmounts> {
        calculate_line(self)
    }

    /// Reject anything that cannot appear on a saved invoice.
    pub fn validate(&self) -> DomainResult<()> {
        if self.title.trim().is_empty() {
            return Err(DomainError::invalid_line_item("title cannot be empty"));
        }
        if !self.quantity.is_positive() {
            return Err(DomainError::invalid_line_item(format!(
                "'{}': quantity must be positive",
                self.title.trim()
            )));
        }
        if self.unit_price.is_negative() {
            return Err(DomainError::invalid_line_item(format!(
                "'{}': unit price cannot be negative",
                self.title.trim()
            )));
        }
        if self.discount.is_negative() {
            return Err(DomainError::invalid_line_item(format!(
                "'{}': discount cannot be negative",
                self.title.trim()
            )));
        }
        if !self.tax_rate.is_within_bounds() {
            return Err(DomainError::invalid_line_item(format!(
                "'{}': tax rate {} must be between 0 and 100",
                self.title.trim(),
                self.tax_rate.as_percent()
            )));
        }

        let amounts = calculate_line(self).map_err(|e| match e {
            DomainError::InvalidAmount(msg) => DomainError::invalid_line_item(msg),
            other => other,
        })?;
        if amounts.total.is_negative() {
            return Err(DomainError::invalid_line_item(format!(
                "'{}': discount {} exceeds the line amount",
                self.title.trim(),
                self.discount
            )));
        }

        Ok(())
    }
}

/// `subtotal = qty * price`, `tax = subtotal * rate / 100`, `total = subtotal + tax - discount`.
///
/// Zero quantity or price yields a zero line. Only arithmetic overflow fails.
pub fn calculate_line(item: &LineItem) -> DomainResult<LineAmounts> {
    let exact_subtotal = item
        .quantity
        .value()
        .checked_mul(item.unit_price.as_decimal())
        .ok_or_else(|| overflow(&item.title))?;
    let exact_tax = exact_subtotal
        .checked_mul(item.tax_rate.as_percent())
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(|| overflow(&item.title))?;

    let subtotal = Money::from_decimal_minor(exact_subtotal)?;
    let tax = Money::from_decimal_minor(exact_tax)?;
    let total = subtotal
        .checked_add(tax)
        .and_then(|gross| gross.checked_sub(item.discount))
        .ok_or_else(|| overflow(&item.title))?;

    Ok(LineAmounts {
        subtotal,
        tax,
        discount: item.discount,
        total,
    })
}

fn overflow(title: &str) -> DomainError {
    DomainError::invalid_amount(format!("'{}': line amount is out of range", title.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(qty: i64, unit_price: i64, rate: i64, discount: i64) -> LineItem {
        LineItem {
            title: "Design work".to_string(),
            product_id: None,
            quantity: Quantity::units(qty),
            unit_price: Money::from_minor(unit_price),
            tax_rate: TaxRate::whole_percent(rate),
            discount: Money::from_minor(discount),
        }
    }

    #[test]
    fn taxed_line() {
        let amounts = calculate_line(&item(2, 1000, 10, 0)).unwrap();
        assert_eq!(amounts.subtotal, Money::from_minor(2000));
        assert_eq!(amounts.tax, Money::from_minor(200));
        assert_eq!(amounts.total, Money::from_minor(2200));
    }

    #[test]
    fn tax_is_charged_before_the_discount() {
        // 1000 + 10% = 1100 - 100 = 1000. Discount-first would give 990.
        let amounts = calculate_line(&item(1, 1000, 10, 100)).unwrap();
        assert_eq!(amounts.tax, Money::from_minor(100));
        assert_eq!(amounts.total, Money::from_minor(1000));
    }

    #[test]
    fn fractional_quantities_and_rates_round_half_up_per_line() {
        let line = LineItem {
            quantity: "1.5".parse().unwrap(),
            tax_rate: "17.5".parse().unwrap(),
            ..item(0, 333, 0, 0)
        };
        // 1.5 * 333 = 499.5 -> 500; 499.5 * 0.175 = 87.4125 -> 87.
        let amounts = calculate_line(&line).unwrap();
        assert_eq!(amounts.subtotal, Money::from_minor(500));
        assert_eq!(amounts.tax, Money::from_minor(87));
        assert_eq!(amounts.total, Money::from_minor(587));
    }

    #[test]
    fn zero_quantity_or_price_is_a_zero_line() {
        assert_eq!(calculate_line(&item(0, 1000, 10, 0)).unwrap().total, Money::ZERO);
        assert_eq!(calculate_line(&item(5, 0, 10, 0)).unwrap().total, Money::ZERO);
        assert!(item(5, 0, 10, 0).validate().is_ok());
    }

    #[test]
    fn validation_reports_invalid_line_items() {
        let cases = [
            LineItem {
                title: "  ".to_string(),
                ..item(1, 100, 0, 0)
            },
            item(0, 100, 0, 0),
            item(-1, 100, 0, 0),
            item(1, -100, 0, 0),
            item(1, 100, 0, -1),
            item(1, 100, -5, 0),
            item(1, 100, 101, 0),
            item(1, 100, 10, 111),
        ];
        for case in cases {
            let err = case.validate().unwrap_err();
            assert!(
                matches!(err, DomainError::InvalidLineItem(_)),
                "{case:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn discount_equal_to_gross_is_allowed() {
        assert!(item(1, 100, 10, 110).validate().is_ok());
    }

    #[test]
    fn overflow_is_reported_not_panicked() {
        let line = LineItem {
            quantity: Quantity::new(Decimal::MAX),
            ..item(0, i64::MAX, 0, 0)
        };
        assert!(calculate_line(&line).is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Integer quantities: the line formula holds exactly and repeated
            /// computation is bit-identical.
            #[test]
            fn line_formula_is_exact_and_deterministic(
                qty in 0i64..10_000,
                price in 0i64..10_000_000,
                rate in 0i64..=100,
                discount in 0i64..1_000_000,
            ) {
                let line = item(qty, price, rate, discount);
                let a = calculate_line(&line).unwrap();
                let b = calculate_line(&line).unwrap();
                let c = calculate_line(&line).unwrap();
                prop_assert_eq!(a, b);
                prop_assert_eq!(b, c);

                let subtotal = qty * price;
                // Half-up rounding of subtotal * rate / 100 in integer arithmetic.
                let tax = (subtotal * rate * 2 + 100) / 200;
                prop_assert_eq!(a.subtotal.minor(), subtotal);
                prop_assert_eq!(a.tax.minor(), tax);
                prop_assert_eq!(a.total.minor(), subtotal + tax - discount);
            }
        }
    }
}
