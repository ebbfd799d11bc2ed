use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use invoicekit_clients::ClientId;
use invoicekit_core::{Money, Quantity, TaxRate};
use invoicekit_products::ProductId;

/// A line as entered by a user, before catalog and settings defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemDraft {
    /// Falls back to the product name.
    pub title: Option<String>,
    pub product_id: Option<ProductId>,
    pub quantity: Quantity,
    /// Falls back to the product's default price.
    pub unit_price: Option<Money>,
    /// Falls back to the tenant's default tax rate.
    pub tax_rate: Option<TaxRate>,
    #[serde(default)]
    pub discount: Money,
}

/// Invoice input for create and revise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub client_id: ClientId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Falls back to the tenant's default currency.
    pub currency: Option<String>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub items: Vec<LineItemDraft>,
}
