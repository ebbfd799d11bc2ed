//! Read-side queries over the projected invoices: listing, dashboard and revenue.
//!
//! Everything here is a pure function of read models and `today`, so queries
//! never touch the event store.

pub mod dashboard;
pub mod listing;
pub mod revenue;

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use invoicekit_clients::ClientId;
use invoicekit_core::Money;
use invoicekit_invoicing::{InvoiceId, InvoiceStatus};

use crate::projections::{ClientReadModel, InvoiceReadModel};

pub use dashboard::{dashboard_summary, DashboardSummary, StatusCounts};
pub use listing::{list_invoices, InvoiceQuery, InvoiceSortKey, Page, PageResult, SortOrder};
pub use revenue::{revenue_report, ClientRevenue, MonthlyRevenue, RevenueQuery, RevenueReport};

/// One row of an invoice list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub invoice_id: InvoiceId,
    pub number: String,
    pub client_id: ClientId,
    pub client_name: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub total: Money,
    pub amount_paid: Money,
    pub amount_due: Money,
    /// Effective status as of the query date.
    pub status: InvoiceStatus,
}

impl InvoiceSummary {
    pub fn of(invoice: &InvoiceReadModel, client_names: &ClientNames, today: NaiveDate) -> Self {
        Self {
            invoice_id: invoice.invoice_id,
            number: invoice.number.clone(),
            client_id: invoice.client_id,
            client_name: client_names.get(&invoice.client_id).cloned(),
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            currency: invoice.currency.clone(),
            total: invoice.totals.total,
            amount_paid: invoice.amount_paid,
            amount_due: invoice.amount_due,
            status: invoice.status_on(today),
        }
    }
}

/// Client display names keyed by id.
pub type ClientNames = HashMap<ClientId, String>;

pub fn client_names(clients: &[ClientReadModel]) -> ClientNames {
    clients
        .iter()
        .map(|c| (c.client_id, c.details.name.clone()))
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{NaiveDate, Utc};

    use invoicekit_clients::ClientId;
    use invoicekit_core::{AggregateId, Money};
    use invoicekit_invoicing::{InvoiceId, InvoiceStatus, InvoiceTotals};

    use crate::projections::InvoiceReadModel;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Read model with a single total; `paid` is applied as-is.
    pub fn invoice(
        sequence: u64,
        client_id: ClientId,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        total: i64,
        paid: i64,
        status: InvoiceStatus,
    ) -> InvoiceReadModel {
        let total = Money::from_minor(total);
        let paid = Money::from_minor(paid);
        let balance = Money::from_minor(total.minor() - paid.minor());
        InvoiceReadModel {
            invoice_id: InvoiceId::new(AggregateId::new()),
            number: format!("INV-{sequence:03}"),
            sequence,
            client_id,
            issue_date,
            due_date,
            currency: "PKR".to_string(),
            notes: None,
            terms: None,
            items: Vec::new(),
            lines: Vec::new(),
            totals: InvoiceTotals {
                subtotal: total,
                tax_total: Money::ZERO,
                discount_total: Money::ZERO,
                total,
            },
            payments: Vec::new(),
            amount_paid: paid,
            amount_due: if balance.is_negative() { Money::ZERO } else { balance },
            credit: if balance.is_negative() {
                Money::from_minor(-balance.minor())
            } else {
                Money::ZERO
            },
            status,
            void_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
