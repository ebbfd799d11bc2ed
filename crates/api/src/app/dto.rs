//! Request/response DTOs and JSON mapping.
//!
//! Money arrives as decimal strings in major units (`"12.50"`; bare JSON
//! numbers are accepted too) and leaves as `{ minor, major, formatted }`.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use invoicekit_clients::{ClientDetails, ClientId};
use invoicekit_core::{format_amount, AggregateId, Money, Quantity, TaxRate};
use invoicekit_infra::billing::{InvoiceDraft, LineItemDraft};
use invoicekit_infra::projections::{ClientReadModel, InvoiceReadModel, ProductReadModel};
use invoicekit_infra::reports::{
    DashboardSummary, InvoiceQuery, InvoiceSummary, Page, PageResult, RevenueReport,
};
use invoicekit_invoicing::{InvoiceId, Payment, PaymentId, PaymentMethod};
use invoicekit_products::{ProductDetails, ProductId};
use invoicekit_settings::{BillingDefaults, CompanyProfile, CompanySettings};

use crate::app::errors::ApiError;

// -------------------------
// Request DTOs
// -------------------------

/// A decimal given either as a JSON string or a JSON number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DecimalInput {
    Text(String),
    Number(serde_json::Number),
}

impl DecimalInput {
    fn as_text(&self) -> String {
        match self {
            DecimalInput::Text(s) => s.trim().to_string(),
            DecimalInput::Number(n) => n.to_string(),
        }
    }

    pub fn to_money(&self) -> Result<Money, ApiError> {
        Ok(Money::from_major_str(&self.as_text())?)
    }
}

pub fn parse_id(raw: &str, what: &str) -> Result<AggregateId, ApiError> {
    raw.trim()
        .parse::<AggregateId>()
        .map_err(|_| ApiError::bad_request("invalid_id", format!("invalid {what} id '{raw}'")))
}

#[derive(Debug, Deserialize)]
pub struct ClientRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl ClientRequest {
    pub fn into_details(self) -> ClientDetails {
        ClientDetails {
            name: self.name,
            email: self.email,
            phone: self.phone,
            address: self.address,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub default_price: DecimalInput,
}

impl ProductRequest {
    pub fn into_details(self) -> Result<ProductDetails, ApiError> {
        Ok(ProductDetails {
            default_price: self.default_price.to_money()?,
            name: self.name,
            description: self.description,
            unit: self.unit,
        })
    }
}

/// Partial update: absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsRequest {
    pub company_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tax_id: Option<String>,
    pub logo_url: Option<String>,
    pub default_tax_rate: Option<DecimalInput>,
    pub default_currency: Option<String>,
    pub numbering_prefix: Option<String>,
    pub next_number: Option<u64>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
}

impl SettingsRequest {
    pub fn merge_into(
        self,
        current: &CompanySettings,
    ) -> Result<(CompanyProfile, BillingDefaults), ApiError> {
        let mut profile = current.profile().clone();
        let mut defaults = current.defaults().clone();

        fn set(slot: &mut Option<String>, value: Option<String>) {
            if let Some(v) = value {
                *slot = Some(v);
            }
        }

        if let Some(name) = self.company_name {
            profile.name = name;
        }
        set(&mut profile.address, self.address);
        set(&mut profile.phone, self.phone);
        set(&mut profile.email, self.email);
        set(&mut profile.tax_id, self.tax_id);
        set(&mut profile.logo_url, self.logo_url);

        if let Some(rate) = self.default_tax_rate {
            defaults.default_tax_rate = rate
                .as_text()
                .parse::<TaxRate>()
                .map_err(|e| ApiError::bad_request("validation_error", e.to_string()))?;
        }
        if let Some(currency) = self.default_currency {
            defaults.default_currency = currency;
        }
        if let Some(prefix) = self.numbering_prefix {
            defaults.numbering_prefix = prefix;
        }
        if let Some(next) = self.next_number {
            defaults.next_number = next;
        }
        if let Some(locale) = self.locale {
            defaults.locale = locale;
        }
        if let Some(timezone) = self.timezone {
            defaults.timezone = timezone;
        }
        Ok((profile, defaults))
    }
}

#[derive(Debug, Deserialize)]
pub struct LineItemRequest {
    pub title: Option<String>,
    pub product_id: Option<String>,
    pub quantity: DecimalInput,
    pub unit_price: Option<DecimalInput>,
    pub tax_rate: Option<DecimalInput>,
    pub discount: Option<DecimalInput>,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceRequest {
    pub client_id: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: Option<String>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    #[serde(default)]
    pub items: Vec<LineItemRequest>,
}

fn line_error(idx: usize, msg: impl core::fmt::Display) -> ApiError {
    ApiError::bad_request("invalid_line_item", format!("line {}: {msg}", idx + 1))
}

impl InvoiceRequest {
    pub fn into_draft(self) -> Result<InvoiceDraft, ApiError> {
        let client_id = ClientId::new(parse_id(&self.client_id, "client")?);

        let mut items = Vec::with_capacity(self.items.len());
        for (idx, line) in self.items.into_iter().enumerate() {
            let product_id = match line.product_id.as_deref().map(str::trim) {
                Some(raw) if !raw.is_empty() => Some(ProductId::new(
                    raw.parse::<AggregateId>().map_err(|_| line_error(idx, "invalid product id"))?,
                )),
                _ => None,
            };
            let quantity = line
                .quantity
                .as_text()
                .parse::<Quantity>()
                .map_err(|e| line_error(idx, e))?;
            let unit_price = line
                .unit_price
                .as_ref()
                .map(DecimalInput::to_money)
                .transpose()?;
            let tax_rate = line
                .tax_rate
                .as_ref()
                .map(|r| r.as_text().parse::<TaxRate>().map_err(|e| line_error(idx, e)))
                .transpose()?;
            let discount = line
                .discount
                .as_ref()
                .map(DecimalInput::to_money)
                .transpose()?
                .unwrap_or(Money::ZERO);

            items.push(LineItemDraft {
                title: line.title,
                product_id,
                quantity,
                unit_price,
                tax_rate,
                discount,
            });
        }

        Ok(InvoiceDraft {
            client_id,
            issue_date: self.issue_date,
            due_date: self.due_date,
            currency: self.currency,
            notes: self.notes,
            terms: self.terms,
            items,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: DecimalInput,
    /// Defaults to today.
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub method: PaymentMethod,
    pub notes: Option<String>,
}

impl PaymentRequest {
    pub fn into_payment(self, today: NaiveDate) -> Result<Payment, ApiError> {
        Ok(Payment {
            payment_id: PaymentId::new(),
            amount: self.amount.to_money()?,
            date: self.date.unwrap_or(today),
            method: self.method,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct VoidInvoiceRequest {
    pub reason: Option<String>,
}

/// `GET /invoices` query string.
#[derive(Debug, Default, Deserialize)]
pub struct ListInvoicesParams {
    pub q: Option<String>,
    pub status: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub as_of: Option<NaiveDate>,
}

impl ListInvoicesParams {
    pub fn to_query(&self) -> Result<InvoiceQuery, ApiError> {
        let parse_err = |e: String| ApiError::bad_request("validation_error", e);
        Ok(InvoiceQuery {
            search: self.q.clone(),
            status: self.status.as_deref().map(str::parse).transpose().map_err(parse_err)?,
            sort: self
                .sort
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(parse_err)?
                .unwrap_or_default(),
            order: self
                .order
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(parse_err)?
                .unwrap_or_default(),
            page: Page::new(self.offset, self.limit),
        })
    }
}

/// Optional evaluation date for status-dependent reads.
#[derive(Debug, Default, Deserialize)]
pub struct AsOfParams {
    pub as_of: Option<NaiveDate>,
}

/// Reports cover one currency at a time; the tenant's default when omitted.
#[derive(Debug, Default, Deserialize)]
pub struct DashboardParams {
    pub as_of: Option<NaiveDate>,
    pub currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RevenueParams {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub currency: Option<String>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn money_to_json(amount: Money, currency: &str) -> JsonValue {
    json!({
        "minor": amount.minor(),
        "major": amount.to_major_string(),
        "formatted": format_amount(amount, currency),
    })
}

pub fn client_to_json(rm: ClientReadModel) -> JsonValue {
    json!({
        "id": rm.client_id.to_string(),
        "name": rm.details.name,
        "email": rm.details.email,
        "phone": rm.details.phone,
        "address": rm.details.address,
        "notes": rm.details.notes,
        "status": rm.status,
        "created_at": rm.created_at,
        "updated_at": rm.updated_at,
    })
}

pub fn product_to_json(rm: ProductReadModel, currency: &str) -> JsonValue {
    json!({
        "id": rm.product_id.to_string(),
        "name": rm.details.name,
        "description": rm.details.description,
        "unit": rm.details.unit,
        "default_price": money_to_json(rm.details.default_price, currency),
        "status": rm.status,
        "created_at": rm.created_at,
        "updated_at": rm.updated_at,
    })
}

pub fn settings_to_json(settings: &CompanySettings) -> JsonValue {
    let profile = settings.profile();
    let defaults = settings.defaults();
    json!({
        "configured": settings.is_configured(),
        "company_name": profile.name,
        "address": profile.address,
        "phone": profile.phone,
        "email": profile.email,
        "tax_id": profile.tax_id,
        "logo_url": profile.logo_url,
        "default_tax_rate": defaults.default_tax_rate.as_percent().normalize().to_string(),
        "default_currency": defaults.default_currency,
        "numbering_prefix": defaults.numbering_prefix,
        "next_number": defaults.next_number,
        "next_invoice_number": settings.preview_next_number(),
        "locale": defaults.locale,
        "timezone": defaults.timezone,
    })
}

pub fn invoice_to_json(rm: InvoiceReadModel, client_name: Option<String>, today: NaiveDate) -> JsonValue {
    let cur = rm.currency.as_str();
    let status = rm.status_on(today);

    let items = rm
        .items
        .iter()
        .zip(rm.lines.iter())
        .map(|(item, amounts)| {
            json!({
                "title": item.title,
                "product_id": item.product_id.map(|p| p.to_string()),
                "quantity": item.quantity.to_string(),
                "unit_price": money_to_json(item.unit_price, cur),
                "tax_rate": item.tax_rate.as_percent().normalize().to_string(),
                "discount": money_to_json(item.discount, cur),
                "subtotal": money_to_json(amounts.subtotal, cur),
                "tax": money_to_json(amounts.tax, cur),
                "total": money_to_json(amounts.total, cur),
            })
        })
        .collect::<Vec<_>>();

    let payments = rm
        .payments
        .iter()
        .map(|p| {
            json!({
                "payment_id": p.payment_id.to_string(),
                "amount": money_to_json(p.amount, cur),
                "date": p.date,
                "method": p.method,
                "notes": p.notes,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "id": rm.invoice_id.to_string(),
        "number": rm.number,
        "sequence": rm.sequence,
        "client_id": rm.client_id.to_string(),
        "client_name": client_name,
        "issue_date": rm.issue_date,
        "due_date": rm.due_date,
        "currency": rm.currency,
        "notes": rm.notes,
        "terms": rm.terms,
        "status": status,
        "recorded_status": rm.status,
        "void_reason": rm.void_reason,
        "items": items,
        "totals": {
            "subtotal": money_to_json(rm.totals.subtotal, cur),
            "tax_total": money_to_json(rm.totals.tax_total, cur),
            "discount_total": money_to_json(rm.totals.discount_total, cur),
            "total": money_to_json(rm.totals.total, cur),
        },
        "amount_paid": money_to_json(rm.amount_paid, cur),
        "amount_due": money_to_json(rm.amount_due, cur),
        "credit": money_to_json(rm.credit, cur),
        "payments": payments,
        "created_at": rm.created_at,
        "updated_at": rm.updated_at,
    })
}

pub fn summary_to_json(row: &InvoiceSummary) -> JsonValue {
    let cur = row.currency.as_str();
    json!({
        "id": row.invoice_id.to_string(),
        "number": row.number,
        "client_id": row.client_id.to_string(),
        "client_name": row.client_name,
        "issue_date": row.issue_date,
        "due_date": row.due_date,
        "currency": row.currency,
        "total": money_to_json(row.total, cur),
        "amount_paid": money_to_json(row.amount_paid, cur),
        "amount_due": money_to_json(row.amount_due, cur),
        "status": row.status,
    })
}

pub fn page_to_json(page: &PageResult<InvoiceSummary>) -> JsonValue {
    json!({
        "items": page.items.iter().map(summary_to_json).collect::<Vec<_>>(),
        "total": page.total,
        "has_more": page.has_more,
    })
}

/// Amounts are rendered in the summary's currency.
pub fn dashboard_to_json(summary: &DashboardSummary) -> JsonValue {
    let currency = summary.currency.as_str();
    json!({
        "as_of": summary.as_of,
        "currency": currency,
        "invoice_count": summary.invoice_count,
        "counts": summary.counts,
        "total_invoiced": money_to_json(summary.total_invoiced, currency),
        "total_collected": money_to_json(summary.total_collected, currency),
        "outstanding": money_to_json(summary.outstanding, currency),
        "overdue_count": summary.overdue_count,
        "overdue_amount": money_to_json(summary.overdue_amount, currency),
        "recent": summary.recent.iter().map(summary_to_json).collect::<Vec<_>>(),
    })
}

pub fn revenue_to_json(report: &RevenueReport) -> JsonValue {
    let currency = report.currency.as_str();
    let months = report
        .months
        .iter()
        .map(|m| {
            json!({
                "month": m.month,
                "invoice_count": m.invoice_count,
                "invoiced": money_to_json(m.invoiced, currency),
                "collected": money_to_json(m.collected, currency),
            })
        })
        .collect::<Vec<_>>();
    let clients = report
        .clients
        .iter()
        .map(|c| {
            json!({
                "client_id": c.client_id.to_string(),
                "client_name": c.client_name,
                "invoice_count": c.invoice_count,
                "invoiced": money_to_json(c.invoiced, currency),
                "paid": money_to_json(c.paid, currency),
                "outstanding": money_to_json(c.outstanding, currency),
            })
        })
        .collect::<Vec<_>>();

    json!({
        "from": report.query.from,
        "to": report.query.to,
        "currency": currency,
        "months": months,
        "clients": clients,
        "total_invoiced": money_to_json(report.total_invoiced, currency),
        "total_collected": money_to_json(report.total_collected, currency),
    })
}

pub fn invoice_id(raw: &str) -> Result<InvoiceId, ApiError> {
    Ok(InvoiceId::new(parse_id(raw, "invoice")?))
}
