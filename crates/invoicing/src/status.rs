//! Invoice status and the single rule set that derives it after a payment.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use invoicekit_core::Money;

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Void,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 5] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Void,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Void => "void",
        }
    }

    /// Sent or overdue: issued and still expecting money.
    pub fn is_open(self) -> bool {
        matches!(self, InvoiceStatus::Sent | InvoiceStatus::Overdue)
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvoiceStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown invoice status '{s}'"))
    }
}

/// First match wins:
/// 1. nothing left to pay -> `Paid`
/// 2. due date already passed -> `Overdue`
/// 3. still a draft -> `Sent` (a payment implicitly issues the invoice)
/// 4. otherwise the prior status is kept
pub fn derive_status(
    total: Money,
    amount_paid: Money,
    due_date: NaiveDate,
    prior: InvoiceStatus,
    today: NaiveDate,
) -> InvoiceStatus {
    let paid_in_full = amount_paid >= total;

    if paid_in_full {
        InvoiceStatus::Paid
    } else if due_date < today {
        InvoiceStatus::Overdue
    } else if prior == InvoiceStatus::Draft {
        InvoiceStatus::Sent
    } else {
        prior
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn full_payment_wins_over_everything() {
        let today = date(2024, 6, 10);
        let past_due = date(2024, 6, 1);
        for prior in [InvoiceStatus::Draft, InvoiceStatus::Sent, InvoiceStatus::Overdue] {
            let status = derive_status(
                Money::from_minor(1000),
                Money::from_minor(1200),
                past_due,
                prior,
                today,
            );
            assert_eq!(status, InvoiceStatus::Paid);
        }
    }

    #[test]
    fn past_due_partial_payment_is_overdue() {
        let status = derive_status(
            Money::from_minor(1000),
            Money::from_minor(100),
            date(2024, 6, 9),
            InvoiceStatus::Sent,
            date(2024, 6, 10),
        );
        assert_eq!(status, InvoiceStatus::Overdue);
    }

    #[test]
    fn due_today_is_not_overdue() {
        let status = derive_status(
            Money::from_minor(1000),
            Money::from_minor(100),
            date(2024, 6, 10),
            InvoiceStatus::Sent,
            date(2024, 6, 10),
        );
        assert_eq!(status, InvoiceStatus::Sent);
    }

    #[test]
    fn draft_becomes_sent_and_sent_is_kept() {
        let today = date(2024, 6, 10);
        let due = date(2024, 7, 1);
        let total = Money::from_minor(1000);
        let paid = Money::from_minor(400);

        assert_eq!(
            derive_status(total, paid, due, InvoiceStatus::Draft, today),
            InvoiceStatus::Sent
        );
        assert_eq!(
            derive_status(total, paid, due, InvoiceStatus::Sent, today),
            InvoiceStatus::Sent
        );
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Overdue".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::Overdue);
        assert!("pending".parse::<InvoiceStatus>().is_err());
    }
}
