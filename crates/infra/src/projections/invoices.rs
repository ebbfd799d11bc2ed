use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use invoicekit_clients::ClientId;
use invoicekit_core::{Money, TenantId};
use invoicekit_events::EventEnvelope;
use invoicekit_invoicing::{
    InvoiceEvent, InvoiceId, InvoiceStatus, InvoiceTotals, LineAmounts, LineItem, Payment,
    Reconciliation,
};

use crate::aggregate_types;
use crate::projections::cursor_store::{InMemoryCursorStore, ProjectionCursorStore, StreamCursors};
use crate::projections::{ensure_envelope_matches, Projection, ProjectionError};
use crate::read_model::{InMemoryTenantStore, TenantStore};

pub const INVOICES_PROJECTION: &str = "invoicing.invoices";

/// Queryable invoice: header, lines with their computed amounts, and the
/// current reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceReadModel {
    pub invoice_id: InvoiceId,
    pub number: String,
    pub sequence: u64,
    pub client_id: ClientId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub items: Vec<LineItem>,
    pub lines: Vec<LineAmounts>,
    pub totals: InvoiceTotals,
    pub payments: Vec<Payment>,
    pub amount_paid: Money,
    pub amount_due: Money,
    pub credit: Money,
    /// Status as recorded by events. See [`InvoiceReadModel::status_on`].
    pub status: InvoiceStatus,
    pub void_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceReadModel {
    /// Status as of `today`: a sent invoice past its due date with money
    /// outstanding reads as overdue even if no event has said so yet.
    pub fn status_on(&self, today: NaiveDate) -> InvoiceStatus {
        match self.status {
            InvoiceStatus::Sent if self.due_date < today && self.amount_due.is_positive() => {
                InvoiceStatus::Overdue
            }
            status => status,
        }
    }

    pub fn is_overdue_on(&self, today: NaiveDate) -> bool {
        self.status_on(today) == InvoiceStatus::Overdue
    }

    fn reconcile(&mut self) {
        if let Ok(r) = Reconciliation::of(self.totals.total, self.amount_paid, self.status) {
            self.amount_due = r.amount_due;
            self.credit = r.credit;
        }
    }
}

fn line_amounts(items: &[LineItem]) -> Vec<LineAmounts> {
    // Items were validated before the event was recorded.
    items
        .iter()
        .map(|item| item.calculate().unwrap_or_default())
        .collect()
}

#[derive(Debug)]
pub struct InvoicesProjection<
    S = InMemoryTenantStore<InvoiceId, InvoiceReadModel>,
    C = InMemoryCursorStore,
> {
    store: S,
    cursors: StreamCursors<C>,
}

impl<S> InvoicesProjection<S>
where
    S: TenantStore<InvoiceId, InvoiceReadModel>,
{
    pub fn new(store: S) -> Self {
        Self::with_cursor_store(store, Arc::new(InMemoryCursorStore::new()))
    }
}

impl<S, C> InvoicesProjection<S, C>
where
    S: TenantStore<InvoiceId, InvoiceReadModel>,
    C: ProjectionCursorStore,
{
    pub fn with_cursor_store(store: S, cursor_store: Arc<C>) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(cursor_store, INVOICES_PROJECTION),
        }
    }

    pub fn get(&self, tenant_id: TenantId, invoice_id: &InvoiceId) -> Option<InvoiceReadModel> {
        self.store.get(tenant_id, invoice_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<InvoiceReadModel> {
        self.store.list(tenant_id)
    }

    fn existing(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<InvoiceReadModel, ProjectionError> {
        self.store
            .get(tenant_id, &invoice_id)
            .ok_or_else(|| ProjectionError::Missing(format!("invoice {invoice_id}")))
    }

    fn apply_event(&self, tenant_id: TenantId, event: InvoiceEvent) -> Result<(), ProjectionError> {
        let (invoice_id, model) = match event {
            InvoiceEvent::InvoiceCreated(e) => {
                let mut rm = InvoiceReadModel {
                    invoice_id: e.invoice_id,
                    number: e.number.display,
                    sequence: e.number.sequence,
                    client_id: e.header.client_id,
                    issue_date: e.header.issue_date,
                    due_date: e.header.due_date,
                    currency: e.header.currency,
                    notes: e.header.notes,
                    terms: e.header.terms,
                    lines: line_amounts(&e.items),
                    items: e.items,
                    totals: e.totals,
                    payments: Vec::new(),
                    amount_paid: Money::ZERO,
                    amount_due: e.totals.total,
                    credit: Money::ZERO,
                    status: InvoiceStatus::Draft,
                    void_reason: None,
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                };
                rm.reconcile();
                (e.invoice_id, rm)
            }
            InvoiceEvent::InvoiceRevised(e) => {
                let mut rm = self.existing(tenant_id, e.invoice_id)?;
                rm.client_id = e.header.client_id;
                rm.issue_date = e.header.issue_date;
                rm.due_date = e.header.due_date;
                rm.currency = e.header.currency;
                rm.notes = e.header.notes;
                rm.terms = e.header.terms;
                rm.lines = line_amounts(&e.items);
                rm.items = e.items;
                rm.totals = e.totals;
                rm.updated_at = e.occurred_at;
                rm.reconcile();
                (e.invoice_id, rm)
            }
            InvoiceEvent::InvoiceSent(e) => {
                let mut rm = self.existing(tenant_id, e.invoice_id)?;
                rm.status = InvoiceStatus::Sent;
                rm.updated_at = e.occurred_at;
                (e.invoice_id, rm)
            }
            InvoiceEvent::PaymentRecorded(e) => {
                let mut rm = self.existing(tenant_id, e.invoice_id)?;
                rm.payments.push(e.payment);
                rm.amount_paid = e.reconciliation.amount_paid;
                rm.amount_due = e.reconciliation.amount_due;
                rm.credit = e.reconciliation.credit;
                rm.status = e.reconciliation.status;
                rm.updated_at = e.occurred_at;
                (e.invoice_id, rm)
            }
            InvoiceEvent::InvoiceMarkedPaid(e) => {
                let mut rm = self.existing(tenant_id, e.invoice_id)?;
                rm.amount_paid = e.amount_paid;
                rm.status = InvoiceStatus::Paid;
                rm.updated_at = e.occurred_at;
                rm.reconcile();
                (e.invoice_id, rm)
            }
            InvoiceEvent::InvoiceVoided(e) => {
                let mut rm = self.existing(tenant_id, e.invoice_id)?;
                rm.status = InvoiceStatus::Void;
                rm.void_reason = e.reason;
                rm.updated_at = e.occurred_at;
                (e.invoice_id, rm)
            }
        };

        self.store.upsert(tenant_id, invoice_id, model);
        Ok(())
    }
}

impl<S, C> Projection for InvoicesProjection<S, C>
where
    S: TenantStore<InvoiceId, InvoiceReadModel>,
    C: ProjectionCursorStore,
{
    fn name(&self) -> &'static str {
        INVOICES_PROJECTION
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::INVOICE {
            return Ok(());
        }
        if !self.cursors.is_next(envelope)? {
            return Ok(());
        }

        let event: InvoiceEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
        ensure_envelope_matches(envelope, event.tenant_id(), event.invoice_id().0)?;

        self.apply_event(envelope.tenant_id(), event)?;
        self.cursors.advance(envelope);
        Ok(())
    }

    fn reset_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear(tenant_id);
    }
}
