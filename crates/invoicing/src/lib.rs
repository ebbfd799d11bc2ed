//! Invoicing domain module (event-sourced).
//!
//! Holds the financial core of the system, implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage):
//!
//! - [`line_item`]: per-line subtotal, tax, discount and total
//! - [`totals`]: invoice-level roll-up, always recomputed from the full item set
//! - [`reconcile`] and [`status`]: payment application and status derivation
//! - [`invoice`]: the `Invoice` aggregate tying them to commands and events

pub mod invoice;
pub mod line_item;
pub mod payment;
pub mod reconcile;
pub mod status;
pub mod totals;

pub use invoice::{
    CreateInvoice, Invoice, InvoiceCommand, InvoiceCreated, InvoiceEvent, InvoiceHeader,
    InvoiceId, InvoiceMarkedPaid, InvoiceRevised, InvoiceSent, InvoiceVoided, MarkInvoicePaid,
    PaymentRecorded, RecordPayment, ReviseInvoice, SendInvoice, VoidInvoice,
};
pub use line_item::{calculate_line, LineAmounts, LineItem};
pub use payment::{Payment, PaymentId, PaymentMethod};
pub use reconcile::{reconcile_payment, InvoiceSnapshot, Reconciliation};
pub use status::{derive_status, InvoiceStatus};
pub use totals::InvoiceTotals;
