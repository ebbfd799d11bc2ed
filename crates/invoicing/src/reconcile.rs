//! Payment reconciler.
//!
//! Overpayment is kept visible: `amount_paid` is the raw ledger sum, `amount_due`
//! is clamped at zero and any surplus is reported as `credit`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use invoicekit_core::{DomainError, DomainResult, Money};

use crate::status::{derive_status, InvoiceStatus};

/// The invoice state a payment is applied against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSnapshot {
    pub total: Money,
    pub amount_paid: Money,
    pub status: InvoiceStatus,
    pub due_date: NaiveDate,
}

/// Paid/due figures of an invoice plus its status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub amount_paid: Money,
    /// `total - amount_paid`; negative when overpaid.
    pub balance: Money,
    pub amount_due: Money,
    pub credit: Money,
    pub status: InvoiceStatus,
}

impl Reconciliation {
    /// Split `total - amount_paid` into the clamped due amount and the surplus.
    pub fn of(total: Money, amount_paid: Money, status: InvoiceStatus) -> DomainResult<Self> {
        let balance = total
            .checked_sub(amount_paid)
            .ok_or_else(|| DomainError::invalid_amount("invoice balance is out of range"))?;
        let (amount_due, credit) = if balance.is_negative() {
            (Money::ZERO, Money::from_minor(balance.minor().saturating_neg()))
        } else {
            (balance, Money::ZERO)
        };

        Ok(Self {
            amount_paid,
            balance,
            amount_due,
            credit,
            status,
        })
    }
}

/// Apply one payment: `amount_paid += amount`, then re-derive the status.
pub fn reconcile_payment(
    snapshot: &InvoiceSnapshot,
    amount: Money,
    today: NaiveDate,
) -> DomainResult<Reconciliation> {
    if !amount.is_positive() {
        return Err(DomainError::invalid_payment(format!(
            "payment amount must be positive, got {amount}"
        )));
    }
    if snapshot.status == InvoiceStatus::Void {
        return Err(DomainError::invalid_payment(
            "payments cannot be recorded on a void invoice",
        ));
    }

    let amount_paid = snapshot
        .amount_paid
        .checked_add(amount)
        .ok_or_else(|| DomainError::invalid_amount("amount paid is out of range"))?;
    let status = derive_status(
        snapshot.total,
        amount_paid,
        snapshot.due_date,
        snapshot.status,
        today,
    );

    Reconciliation::of(snapshot.total, amount_paid, status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sent_invoice(total: i64, due_date: NaiveDate) -> InvoiceSnapshot {
        InvoiceSnapshot {
            total: Money::from_minor(total),
            amount_paid: Money::ZERO,
            status: InvoiceStatus::Sent,
            due_date,
        }
    }

    fn apply(snapshot: &mut InvoiceSnapshot, amount: i64, today: NaiveDate) -> Reconciliation {
        let r = reconcile_payment(snapshot, Money::from_minor(amount), today).unwrap();
        snapshot.amount_paid = r.amount_paid;
        snapshot.status = r.status;
        r
    }

    #[test]
    fn partial_then_final_payment() {
        let today = date(2024, 3, 1);
        let mut invoice = sent_invoice(1000, date(2024, 3, 31));

        let first = apply(&mut invoice, 400, today);
        assert_eq!(first.amount_paid, Money::from_minor(400));
        assert_eq!(first.amount_due, Money::from_minor(600));
        assert_eq!(first.status, InvoiceStatus::Sent);

        let second = apply(&mut invoice, 600, today);
        assert_eq!(second.amount_paid, Money::from_minor(1000));
        assert_eq!(second.amount_due, Money::ZERO);
        assert_eq!(second.status, InvoiceStatus::Paid);
    }

    #[test]
    fn partial_payment_after_due_date_is_overdue() {
        let today = date(2024, 3, 2);
        let mut invoice = sent_invoice(1000, date(2024, 3, 1));

        let r = apply(&mut invoice, 100, today);
        assert_eq!(r.amount_due, Money::from_minor(900));
        assert_eq!(r.status, InvoiceStatus::Overdue);
    }

    #[test]
    fn overpayment_keeps_raw_sum_and_reports_credit() {
        let mut invoice = sent_invoice(1000, date(2024, 3, 31));
        let r = apply(&mut invoice, 1250, date(2024, 3, 1));

        assert_eq!(r.amount_paid, Money::from_minor(1250));
        assert_eq!(r.balance, Money::from_minor(-250));
        assert_eq!(r.amount_due, Money::ZERO);
        assert_eq!(r.credit, Money::from_minor(250));
        assert_eq!(r.status, InvoiceStatus::Paid);
    }

    #[test]
    fn non_positive_amounts_are_invalid_payments() {
        let invoice = sent_invoice(1000, date(2024, 3, 31));
        for amount in [0, -1] {
            let err = reconcile_payment(&invoice, Money::from_minor(amount), date(2024, 3, 1))
                .unwrap_err();
            assert!(matches!(err, DomainError::InvalidPayment(_)));
        }
    }

    #[test]
    fn void_invoices_reject_payments() {
        let invoice = InvoiceSnapshot {
            status: InvoiceStatus::Void,
            ..sent_invoice(1000, date(2024, 3, 31))
        };
        let err =
            reconcile_payment(&invoice, Money::from_minor(10), date(2024, 3, 1)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidPayment(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Sequential payments sum exactly; the due amount never goes negative
            /// and the signed balance keeps the true difference.
            #[test]
            fn sequential_payments_sum(
                total in 0i64..10_000_000,
                payments in prop::collection::vec(1i64..1_000_000, 1..20),
            ) {
                let today = date(2024, 1, 1);
                let mut invoice = InvoiceSnapshot {
                    total: Money::from_minor(total),
                    amount_paid: Money::ZERO,
                    status: InvoiceStatus::Draft,
                    due_date: date(2024, 12, 31),
                };

                let mut last = None;
                for amount in &payments {
                    last = Some(apply(&mut invoice, *amount, today));
                }
                let last = last.unwrap();
                let sum: i64 = payments.iter().sum();

                prop_assert_eq!(last.amount_paid.minor(), sum);
                prop_assert_eq!(last.balance.minor(), total - sum);
                prop_assert_eq!(last.amount_due.minor(), (total - sum).max(0));
                prop_assert_eq!(last.credit.minor(), (sum - total).max(0));
                prop_assert_eq!(last.status == InvoiceStatus::Paid, sum >= total);
            }
        }
    }
}
