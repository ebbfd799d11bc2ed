use std::cmp::Ordering;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use invoicekit_invoicing::InvoiceStatus;

use super::{ClientNames, InvoiceSummary};
use crate::projections::InvoiceReadModel;

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Offset pagination.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    /// Missing values take defaults; `limit` is clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn new(offset: Option<usize>, limit: Option<usize>) -> Self {
        Self {
            offset: offset.unwrap_or(0),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    /// Matches before pagination.
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceSortKey {
    #[default]
    IssueDate,
    DueDate,
    Total,
    Number,
}

impl FromStr for InvoiceSortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "issue_date" | "issue" => Ok(Self::IssueDate),
            "due_date" | "due" => Ok(Self::DueDate),
            "total" => Ok(Self::Total),
            "number" => Ok(Self::Number),
            other => Err(format!("unknown sort key '{other}'")),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort order '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceQuery {
    /// Case-insensitive substring on the invoice number or client name.
    pub search: Option<String>,
    /// Matched against the effective status (see [`InvoiceReadModel::status_on`]).
    pub status: Option<InvoiceStatus>,
    pub sort: InvoiceSortKey,
    pub order: SortOrder,
    pub page: Page,
}

fn compare(a: &InvoiceSummary, b: &InvoiceSummary, key: InvoiceSortKey) -> Ordering {
    let primary = match key {
        InvoiceSortKey::IssueDate => a.issue_date.cmp(&b.issue_date),
        InvoiceSortKey::DueDate => a.due_date.cmp(&b.due_date),
        InvoiceSortKey::Total => a.total.cmp(&b.total),
        InvoiceSortKey::Number => a.number.cmp(&b.number),
    };
    // Stable tiebreak so pages never overlap.
    primary.then_with(|| a.number.cmp(&b.number))
}

pub fn list_invoices(
    invoices: &[InvoiceReadModel],
    client_names: &ClientNames,
    query: &InvoiceQuery,
    today: NaiveDate,
) -> PageResult<InvoiceSummary> {
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut rows: Vec<InvoiceSummary> = invoices
        .iter()
        .map(|inv| InvoiceSummary::of(inv, client_names, today))
        .filter(|row| query.status.map_or(true, |s| row.status == s))
        .filter(|row| match &needle {
            None => true,
            Some(needle) => {
                row.number.to_lowercase().contains(needle)
                    || row
                        .client_name
                        .as_deref()
                        .is_some_and(|name| name.to_lowercase().contains(needle))
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        let ord = compare(a, b, query.sort);
        match query.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });

    let total = rows.len();
    let items: Vec<_> = rows
        .into_iter()
        .skip(query.page.offset)
        .take(query.page.limit)
        .collect();
    let has_more = query.page.offset.saturating_add(items.len()) < total;

    PageResult {
        items,
        total,
        has_more,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use invoicekit_clients::ClientId;
    use invoicekit_core::{AggregateId, Money};

    use crate::reports::fixtures::{date, invoice};

    fn sample() -> (Vec<InvoiceReadModel>, ClientNames) {
        let acme = ClientId::new(AggregateId::new());
        let globex = ClientId::new(AggregateId::new());
        let invoices = vec![
            invoice(1, acme, date(2025, 1, 5), date(2025, 1, 20), 1000, 0, InvoiceStatus::Draft),
            invoice(2, globex, date(2025, 1, 10), date(2025, 2, 10), 5000, 0, InvoiceStatus::Sent),
            invoice(3, acme, date(2025, 2, 1), date(2025, 2, 15), 3000, 3000, InvoiceStatus::Paid),
            invoice(4, globex, date(2025, 1, 1), date(2025, 1, 15), 2000, 500, InvoiceStatus::Sent),
        ];
        let names = ClientNames::from([
            (acme, "Acme Corp".to_string()),
            (globex, "Globex".to_string()),
        ]);
        (invoices, names)
    }

    #[test]
    fn default_query_sorts_by_issue_date_descending() {
        let (invoices, names) = sample();
        let page = list_invoices(&invoices, &names, &InvoiceQuery::default(), date(2025, 1, 12));
        let numbers: Vec<_> = page.items.iter().map(|r| r.number.as_str()).collect();
        assert_eq!(numbers, vec!["INV-003", "INV-002", "INV-001", "INV-004"]);
        assert_eq!(page.total, 4);
        assert!(!page.has_more);
    }

    #[test]
    fn search_matches_number_or_client_name() {
        let (invoices, names) = sample();
        let today = date(2025, 1, 12);

        let by_client = InvoiceQuery {
            search: Some("acme".to_string()),
            ..InvoiceQuery::default()
        };
        assert_eq!(list_invoices(&invoices, &names, &by_client, today).total, 2);

        let by_number = InvoiceQuery {
            search: Some(" inv-002 ".to_string()),
            ..InvoiceQuery::default()
        };
        let page = list_invoices(&invoices, &names, &by_number, today);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].client_name.as_deref(), Some("Globex"));
    }

    #[test]
    fn status_filter_uses_effective_overdue_status() {
        let (invoices, names) = sample();
        let query = InvoiceQuery {
            status: Some(InvoiceStatus::Overdue),
            ..InvoiceQuery::default()
        };
        let page = list_invoices(&invoices, &names, &query, date(2025, 1, 16));
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].number, "INV-004");
        assert_eq!(page.items[0].amount_due, Money::from_minor(1500));
    }

    #[test]
    fn sorts_by_total_ascending_and_paginates() {
        let (invoices, names) = sample();
        let query = InvoiceQuery {
            sort: InvoiceSortKey::Total,
            order: SortOrder::Asc,
            page: Page::new(Some(1), Some(2)),
            ..InvoiceQuery::default()
        };
        let page = list_invoices(&invoices, &names, &query, date(2025, 1, 12));
        let totals: Vec<_> = page.items.iter().map(|r| r.total.minor()).collect();
        assert_eq!(totals, vec![2000, 3000]);
        assert_eq!(page.total, 4);
        assert!(page.has_more);
    }

    #[test]
    fn page_limit_is_clamped() {
        assert_eq!(Page::new(None, Some(0)).limit, 1);
        assert_eq!(Page::new(None, Some(10_000)).limit, MAX_PAGE_LIMIT);
        assert_eq!(Page::new(None, None), Page::default());
    }

    #[test]
    fn parses_sort_parameters() {
        assert_eq!("due_date".parse::<InvoiceSortKey>().unwrap(), InvoiceSortKey::DueDate);
        assert_eq!("ASC".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!("amount".parse::<InvoiceSortKey>().is_err());
    }
}
