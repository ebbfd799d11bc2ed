use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use invoicekit_clients::ClientId;
use invoicekit_core::Money;
use invoicekit_invoicing::InvoiceStatus;

use super::ClientNames;
use crate::projections::InvoiceReadModel;

/// Optional inclusive issue-date window.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl RevenueQuery {
    fn includes(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyRevenue {
    /// `YYYY-MM` of the issue date.
    pub month: String,
    pub invoice_count: usize,
    pub invoiced: Money,
    pub collected: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRevenue {
    pub client_id: ClientId,
    pub client_name: Option<String>,
    pub invoice_count: usize,
    pub invoiced: Money,
    pub paid: Money,
    pub outstanding: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueReport {
    pub query: RevenueQuery,
    pub currency: String,
    /// Oldest month first.
    pub months: Vec<MonthlyRevenue>,
    /// Largest invoiced amount first.
    pub clients: Vec<ClientRevenue>,
    pub total_invoiced: Money,
    pub total_collected: Money,
}

fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Covers the non-void invoices issued in `currency`.
pub fn revenue_report(
    invoices: &[InvoiceReadModel],
    client_names: &ClientNames,
    currency: &str,
    query: RevenueQuery,
) -> RevenueReport {
    let mut months: BTreeMap<String, MonthlyRevenue> = BTreeMap::new();
    let mut clients: HashMap<ClientId, ClientRevenue> = HashMap::new();

    for invoice in invoices
        .iter()
        .filter(|inv| inv.status != InvoiceStatus::Void)
        .filter(|inv| inv.currency == currency)
        .filter(|inv| query.includes(inv.issue_date))
    {
        let key = month_key(invoice.issue_date);
        let month = months.entry(key.clone()).or_insert_with(|| MonthlyRevenue {
            month: key,
            invoice_count: 0,
            invoiced: Money::ZERO,
            collected: Money::ZERO,
        });
        month.invoice_count += 1;
        month.invoiced = month.invoiced.saturating_add(invoice.totals.total);
        month.collected = month.collected.saturating_add(invoice.amount_paid);

        let client = clients
            .entry(invoice.client_id)
            .or_insert_with(|| ClientRevenue {
                client_id: invoice.client_id,
                client_name: client_names.get(&invoice.client_id).cloned(),
                invoice_count: 0,
                invoiced: Money::ZERO,
                paid: Money::ZERO,
                outstanding: Money::ZERO,
            });
        client.invoice_count += 1;
        client.invoiced = client.invoiced.saturating_add(invoice.totals.total);
        client.paid = client.paid.saturating_add(invoice.amount_paid);
        client.outstanding = client.outstanding.saturating_add(invoice.amount_due);
    }

    let months: Vec<MonthlyRevenue> = months.into_values().collect();
    let mut clients: Vec<ClientRevenue> = clients.into_values().collect();
    clients.sort_by(|a, b| {
        b.invoiced
            .cmp(&a.invoiced)
            .then_with(|| a.client_name.cmp(&b.client_name))
    });

    RevenueReport {
        query,
        currency: currency.to_string(),
        total_invoiced: months.iter().map(|m| m.invoiced).sum(),
        total_collected: months.iter().map(|m| m.collected).sum(),
        months,
        clients,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use invoicekit_core::AggregateId;

    use crate::reports::fixtures::{date, invoice};

    fn euro(mut invoice: InvoiceReadModel) -> InvoiceReadModel {
        invoice.currency = "EUR".to_string();
        invoice
    }

    #[test]
    fn groups_by_issue_month_and_client() {
        let acme = ClientId::new(AggregateId::new());
        let globex = ClientId::new(AggregateId::new());
        let invoices = vec![
            invoice(1, acme, date(2025, 1, 3), date(2025, 2, 1), 1000, 1000, InvoiceStatus::Paid),
            invoice(2, globex, date(2025, 1, 20), date(2025, 2, 1), 4000, 1000, InvoiceStatus::Sent),
            invoice(3, acme, date(2025, 2, 2), date(2025, 3, 1), 500, 0, InvoiceStatus::Sent),
            invoice(4, acme, date(2025, 2, 5), date(2025, 3, 1), 800, 0, InvoiceStatus::Void),
            euro(invoice(5, globex, date(2025, 2, 6), date(2025, 3, 1), 7000, 0, InvoiceStatus::Sent)),
        ];
        let names = ClientNames::from([(acme, "Acme".to_string()), (globex, "Globex".to_string())]);

        let report = revenue_report(&invoices, &names, "PKR", RevenueQuery::default());

        assert_eq!(report.months.len(), 2);
        assert_eq!(report.months[0].month, "2025-01");
        assert_eq!(report.months[0].invoiced, Money::from_minor(5000));
        assert_eq!(report.months[0].collected, Money::from_minor(2000));
        assert_eq!(report.months[1].month, "2025-02");
        assert_eq!(report.months[1].invoiced, Money::from_minor(500));

        assert_eq!(report.clients[0].client_name.as_deref(), Some("Globex"));
        assert_eq!(report.clients[0].outstanding, Money::from_minor(3000));
        assert_eq!(report.clients[1].invoiced, Money::from_minor(1500));
        assert_eq!(report.clients[1].invoice_count, 2);

        assert_eq!(report.total_invoiced, Money::from_minor(5500));
        assert_eq!(report.total_collected, Money::from_minor(2000));

        let report = revenue_report(&invoices, &names, "EUR", RevenueQuery::default());
        assert_eq!(report.currency, "EUR");
        assert_eq!(report.clients.len(), 1);
        assert_eq!(report.total_invoiced, Money::from_minor(7000));
    }

    #[test]
    fn date_window_is_inclusive() {
        let client = ClientId::new(AggregateId::new());
        let invoices = vec![
            invoice(1, client, date(2025, 1, 31), date(2025, 2, 1), 100, 0, InvoiceStatus::Sent),
            invoice(2, client, date(2025, 2, 1), date(2025, 3, 1), 200, 0, InvoiceStatus::Sent),
            invoice(3, client, date(2025, 3, 1), date(2025, 4, 1), 400, 0, InvoiceStatus::Sent),
        ];
        let query = RevenueQuery {
            from: Some(date(2025, 2, 1)),
            to: Some(date(2025, 3, 1)),
        };
        let report = revenue_report(&invoices, &ClientNames::new(), "PKR", query);
        assert_eq!(report.total_invoiced, Money::from_minor(600));
    }
}
