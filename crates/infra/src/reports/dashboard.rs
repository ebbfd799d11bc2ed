use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use invoicekit_core::Money;
use invoicekit_invoicing::InvoiceStatus;

use super::{ClientNames, InvoiceSummary};
use crate::projections::InvoiceReadModel;

pub const RECENT_INVOICES: usize = 5;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub draft: usize,
    pub sent: usize,
    pub paid: usize,
    pub overdue: usize,
    pub void: usize,
}

impl StatusCounts {
    fn bump(&mut self, status: InvoiceStatus) {
        match status {
            InvoiceStatus::Draft => self.draft += 1,
            InvoiceStatus::Sent => self.sent += 1,
            InvoiceStatus::Paid => self.paid += 1,
            InvoiceStatus::Overdue => self.overdue += 1,
            InvoiceStatus::Void => self.void += 1,
        }
    }
}

/// Totals for the invoices of one currency; amounts in different currencies are
/// never added together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub as_of: NaiveDate,
    pub currency: String,
    pub invoice_count: usize,
    pub counts: StatusCounts,
    /// Sum of totals of non-void invoices.
    pub total_invoiced: Money,
    pub total_collected: Money,
    /// Amount due on sent and overdue invoices.
    pub outstanding: Money,
    pub overdue_count: usize,
    pub overdue_amount: Money,
    pub recent: Vec<InvoiceSummary>,
}

pub fn dashboard_summary(
    invoices: &[InvoiceReadModel],
    client_names: &ClientNames,
    currency: &str,
    today: NaiveDate,
) -> DashboardSummary {
    let invoices: Vec<&InvoiceReadModel> = invoices
        .iter()
        .filter(|inv| inv.currency == currency)
        .collect();

    let mut counts = StatusCounts::default();
    let mut total_invoiced = Money::ZERO;
    let mut total_collected = Money::ZERO;
    let mut outstanding = Money::ZERO;
    let mut overdue_amount = Money::ZERO;

    for invoice in &invoices {
        let status = invoice.status_on(today);
        counts.bump(status);
        if status == InvoiceStatus::Void {
            continue;
        }
        total_invoiced = total_invoiced.saturating_add(invoice.totals.total);
        total_collected = total_collected.saturating_add(invoice.amount_paid);
        if status.is_open() {
            outstanding = outstanding.saturating_add(invoice.amount_due);
        }
        if status == InvoiceStatus::Overdue {
            overdue_amount = overdue_amount.saturating_add(invoice.amount_due);
        }
    }

    let mut recent = invoices.clone();
    recent.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.sequence.cmp(&a.sequence))
    });
    let recent = recent
        .into_iter()
        .take(RECENT_INVOICES)
        .map(|inv| InvoiceSummary::of(inv, client_names, today))
        .collect();

    DashboardSummary {
        as_of: today,
        currency: currency.to_string(),
        invoice_count: invoices.len(),
        overdue_count: counts.overdue,
        counts,
        total_invoiced,
        total_collected,
        outstanding,
        overdue_amount,
        recent,
    }
}
