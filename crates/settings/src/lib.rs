//! Per-tenant company settings (event-sourced).
//!
//! One `CompanySettings` stream exists per tenant; its aggregate id is the tenant id.
//! Besides the company profile and billing defaults it owns the invoice number
//! counter, which is only ever advanced through [`ReserveInvoiceNumber`].

pub mod numbering;
pub mod settings;

pub use numbering::{format_invoice_number, InvoiceNumber, DEFAULT_NUMBER_WIDTH};
pub use settings::{
    BillingDefaults, CompanyProfile, CompanySettings, ConfigureSettings, InvoiceNumberReserved,
    ReserveInvoiceNumber, SettingsCommand, SettingsConfigured, SettingsEvent, SettingsId,
    DEFAULT_CURRENCY, DEFAULT_LOCALE, DEFAULT_NUMBERING_PREFIX, DEFAULT_TIMEZONE, MAX_NEXT_NUMBER,
};
