//! Invoice aggregator: rolls line amounts up into invoice totals.

use serde::{Deserialize, Serialize};

use invoicekit_core::{DomainError, DomainResult, Money};

use crate::line_item::{calculate_line, LineAmounts, LineItem};

/// Invoice-level totals. Always `total == subtotal + tax_total - discount_total`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Money,
    pub tax_total: Money,
    pub discount_total: Money,
    pub total: Money,
}

impl InvoiceTotals {
    /// Recompute from the full item set. No items gives all zeros.
    pub fn from_items(items: &[LineItem]) -> DomainResult<Self> {
        let lines = items
            .iter()
            .map(calculate_line)
            .collect::<DomainResult<Vec<_>>>()?;
        Self::from_lines(&lines)
    }

    pub fn from_lines(lines: &[LineAmounts]) -> DomainResult<Self> {
        let mut totals = Self::default();
        for line in lines {
            totals.subtotal = add(totals.subtotal, line.subtotal)?;
            totals.tax_total = add(totals.tax_total, line.tax)?;
            totals.discount_total = add(totals.discount_total, line.discount)?;
        }
        totals.total = add(totals.subtotal, totals.tax_total)?
            .checked_sub(totals.discount_total)
            .ok_or_else(out_of_range)?;
        Ok(totals)
    }
}

fn add(a: Money, b: Money) -> DomainResult<Money> {
    a.checked_add(b).ok_or_else(out_of_range)
}

fn out_of_range() -> DomainError {
    DomainError::invalid_amount("invoice total is out of range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoicekit_core::{Quantity, TaxRate};

    fn item(qty: i64, unit_price: i64, rate: i64, discount: i64) -> LineItem {
        LineItem {
            title: "Item".to_string(),
            product_id: None,
            quantity: Quantity::units(qty),
            unit_price: Money::from_minor(unit_price),
            tax_rate: TaxRate::whole_percent(rate),
            discount: Money::from_minor(discount),
        }
    }

    #[test]
    fn single_taxed_line() {
        let totals = InvoiceTotals::from_items(&[item(2, 1000, 10, 0)]).unwrap();
        assert_eq!(totals.subtotal, Money::from_minor(2000));
        assert_eq!(totals.tax_total, Money::from_minor(200));
        assert_eq!(totals.total, Money::from_minor(2200));
    }

    #[test]
    fn discount_and_tax_across_lines() {
        let items = [item(1, 500, 0, 50), item(3, 300, 5, 0)];

        let first = calculate_line(&items[0]).unwrap();
        let second = calculate_line(&items[1]).unwrap();
        assert_eq!(first.total, Money::from_minor(450));
        assert_eq!(second.subtotal, Money::from_minor(900));
        assert_eq!(second.tax, Money::from_minor(45));
        assert_eq!(second.total, Money::from_minor(945));

        let totals = InvoiceTotals::from_items(&items).unwrap();
        assert_eq!(
            totals,
            InvoiceTotals {
                subtotal: Money::from_minor(1400),
                tax_total: Money::from_minor(45),
                discount_total: Money::from_minor(50),
                total: Money::from_minor(1395),
            }
        );
    }

    #[test]
    fn no_items_is_all_zero() {
        assert_eq!(InvoiceTotals::from_items(&[]).unwrap(), InvoiceTotals::default());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_item() -> impl Strategy<Value = LineItem> {
            (0i64..1_000, 0i64..1_000_000, 0i64..=100, 0i64..10_000)
                .prop_map(|(q, p, r, d)| item(q, p, r, d))
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            #[test]
            fn total_identity_holds(items in prop::collection::vec(arb_item(), 0..20)) {
                let totals = InvoiceTotals::from_items(&items).unwrap();
                prop_assert_eq!(
                    totals.total.minor(),
                    totals.subtotal.minor() + totals.tax_total.minor() - totals.discount_total.minor()
                );
            }

            #[test]
            fn recomputation_is_idempotent(items in prop::collection::vec(arb_item(), 0..20)) {
                let first = InvoiceTotals::from_items(&items).unwrap();
                let second = InvoiceTotals::from_items(&items).unwrap();
                prop_assert_eq!(first, second);
            }

            /// Item order is display-only.
            #[test]
            fn order_does_not_matter(items in prop::collection::vec(arb_item(), 0..20)) {
                let mut reversed = items.clone();
                reversed.reverse();
                prop_assert_eq!(
                    InvoiceTotals::from_items(&items).unwrap(),
                    InvoiceTotals::from_items(&reversed).unwrap()
                );
            }
        }
    }
}
