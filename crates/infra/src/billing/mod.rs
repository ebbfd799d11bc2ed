//! Application services: the command side of invoicing.
//!
//! `BillingService` turns requests into aggregate commands, checks references
//! across aggregates (clients, products, settings defaults) and owns the two
//! concurrency-sensitive flows:
//!
//! - invoice creation reserves the next number on the tenant's settings stream
//!   and creates the invoice stream in one atomic commit
//! - payment recording re-reads the invoice and retries when another writer won

mod draft;
mod error;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use invoicekit_clients::{
    ArchiveClient, Client, ClientCommand, ClientDetails, ClientId, RegisterClient, UpdateClient,
};
use invoicekit_core::{AggregateId, TenantId};
use invoicekit_events::{EventBus, EventEnvelope};
use invoicekit_invoicing::{
    CreateInvoice, Invoice, InvoiceCommand, InvoiceHeader, InvoiceId, LineItem, MarkInvoicePaid,
    Payment, RecordPayment, ReviseInvoice, SendInvoice, VoidInvoice,
};
use invoicekit_products::{
    ArchiveProduct, CreateProduct, Product, ProductCommand, ProductDetails, ProductId,
    UpdateProduct,
};
use invoicekit_settings::{
    BillingDefaults, CompanyProfile, CompanySettings, ConfigureSettings, InvoiceNumber,
    ReserveInvoiceNumber, SettingsCommand, SettingsId,
};

use crate::aggregate_types;
use crate::command_dispatcher::{CommandDispatcher, Committed, DispatchError};
use crate::event_store::EventStore;

pub use draft::{InvoiceDraft, LineItemDraft};
pub use error::BillingError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Outcome of one attempt inside a retry loop.
enum AttemptError {
    /// Lost an optimistic-concurrency race; safe to redo from a fresh load.
    Stale(String),
    Failed(BillingError),
}

impl From<DispatchError> for AttemptError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Concurrency(msg) => AttemptError::Stale(msg),
            other => AttemptError::Failed(other.into()),
        }
    }
}

impl From<BillingError> for AttemptError {
    fn from(value: BillingError) -> Self {
        AttemptError::Failed(value)
    }
}

fn make_client(_: TenantId, id: AggregateId) -> Client {
    Client::empty(ClientId::new(id))
}

fn make_product(_: TenantId, id: AggregateId) -> Product {
    Product::empty(ProductId::new(id))
}

fn make_invoice(_: TenantId, id: AggregateId) -> Invoice {
    Invoice::empty(InvoiceId::new(id))
}

fn make_settings(tenant_id: TenantId, _: AggregateId) -> CompanySettings {
    CompanySettings::empty(SettingsId::for_tenant(tenant_id))
}

#[derive(Debug)]
pub struct BillingService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    max_retries: u32,
}

impl<S, B> BillingService<S, B> {
    pub fn new(dispatcher: CommandDispatcher<S, B>, max_retries: u32) -> Self {
        Self {
            dispatcher,
            max_retries,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl<S, B> BillingService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run `attempt` until it stops losing optimistic-concurrency races, at most
    /// `max_retries` extra times. The last conflict is returned when exhausted.
    fn with_retries<T>(
        &self,
        operation: &str,
        mut attempt: impl FnMut() -> Result<T, AttemptError>,
    ) -> Result<T, AttemptError> {
        let mut retries = 0;
        loop {
            match attempt() {
                Err(AttemptError::Stale(msg)) if retries < self.max_retries => {
                    retries += 1;
                    debug!(operation, retries, reason = %msg, "retrying after concurrent write");
                }
                Err(AttemptError::Stale(msg)) => {
                    warn!(operation, retries, "giving up after concurrent writes");
                    return Err(AttemptError::Stale(msg));
                }
                other => return other,
            }
        }
    }

    // -- settings -------------------------------------------------------------

    /// Current settings; an unconfigured tenant gets the defaults.
    pub fn settings(&self, tenant_id: TenantId) -> Result<CompanySettings, BillingError> {
        Ok(self
            .dispatcher
            .load(tenant_id, SettingsId::for_tenant(tenant_id).0, make_settings)?)
    }

    #[instrument(skip(self, profile, defaults), fields(tenant_id = %tenant_id), err)]
    pub fn configure_settings(
        &self,
        tenant_id: TenantId,
        profile: CompanyProfile,
        defaults: BillingDefaults,
        now: DateTime<Utc>,
    ) -> Result<Committed<CompanySettings>, BillingError> {
        let command = SettingsCommand::ConfigureSettings(ConfigureSettings {
            tenant_id,
            profile,
            defaults,
            occurred_at: now,
        });
        Ok(self.dispatcher.dispatch(
            tenant_id,
            SettingsId::for_tenant(tenant_id).0,
            aggregate_types::SETTINGS,
            &command,
            make_settings,
        )?)
    }

    // -- clients --------------------------------------------------------------

    pub fn client(&self, tenant_id: TenantId, client_id: ClientId) -> Result<Client, BillingError> {
        let client = self.dispatcher.load(tenant_id, client_id.0, make_client)?;
        if client.tenant_id().is_none() {
            return Err(BillingError::not_found(format!("client {client_id}")));
        }
        Ok(client)
    }

    #[instrument(skip(self, details), fields(tenant_id = %tenant_id), err)]
    pub fn register_client(
        &self,
        tenant_id: TenantId,
        details: ClientDetails,
        now: DateTime<Utc>,
    ) -> Result<Committed<Client>, BillingError> {
        let client_id = ClientId::new(AggregateId::new());
        let command = ClientCommand::RegisterClient(RegisterClient {
            tenant_id,
            client_id,
            details,
            occurred_at: now,
        });
        let committed = self.dispatcher.dispatch(
            tenant_id,
            client_id.0,
            aggregate_types::CLIENT,
            &command,
            make_client,
        )?;
        info!(client_id = %client_id, "client registered");
        Ok(committed)
    }

    #[instrument(skip(self, details), fields(tenant_id = %tenant_id, client_id = %client_id), err)]
    pub fn update_client(
        &self,
        tenant_id: TenantId,
        client_id: ClientId,
        details: ClientDetails,
        now: DateTime<Utc>,
    ) -> Result<Committed<Client>, BillingError> {
        let command = ClientCommand::UpdateClient(UpdateClient {
            tenant_id,
            client_id,
            details,
            occurred_at: now,
        });
        self.dispatcher
            .dispatch(tenant_id, client_id.0, aggregate_types::CLIENT, &command, make_client)
            .map_err(|e| BillingError::from_dispatch(e, &format!("client {client_id}")))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, client_id = %client_id), err)]
    pub fn archive_client(
        &self,
        tenant_id: TenantId,
        client_id: ClientId,
        now: DateTime<Utc>,
    ) -> Result<Committed<Client>, BillingError> {
        let command = ClientCommand::ArchiveClient(ArchiveClient {
            tenant_id,
            client_id,
            occurred_at: now,
        });
        self.dispatcher
            .dispatch(tenant_id, client_id.0, aggregate_types::CLIENT, &command, make_client)
            .map_err(|e| BillingError::from_dispatch(e, &format!("client {client_id}")))
    }

    // -- products -------------------------------------------------------------

    pub fn product(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Product, BillingError> {
        let product = self.dispatcher.load(tenant_id, product_id.0, make_product)?;
        if product.tenant_id().is_none() {
            return Err(BillingError::not_found(format!("product {product_id}")));
        }
        Ok(product)
    }

    #[instrument(skip(self, details), fields(tenant_id = %tenant_id), err)]
    pub fn create_product(
        &self,
        tenant_id: TenantId,
        details: ProductDetails,
        now: DateTime<Utc>,
    ) -> Result<Committed<Product>, BillingError> {
        let product_id = ProductId::new(AggregateId::new());
        let command = ProductCommand::CreateProduct(CreateProduct {
            tenant_id,
            product_id,
            details,
            occurred_at: now,
        });
        let committed = self.dispatcher.dispatch(
            tenant_id,
            product_id.0,
            aggregate_types::PRODUCT,
            &command,
            make_product,
        )?;
        info!(product_id = %product_id, "product created");
        Ok(committed)
    }

    #[instrument(skip(self, details), fields(tenant_id = %tenant_id, product_id = %product_id), err)]
    pub fn update_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        details: ProductDetails,
        now: DateTime<Utc>,
    ) -> Result<Committed<Product>, BillingError> {
        let command = ProductCommand::UpdateProduct(UpdateProduct {
            tenant_id,
            product_id,
            details,
            occurred_at: now,
        });
        self.dispatcher
            .dispatch(tenant_id, product_id.0, aggregate_types::PRODUCT, &command, make_product)
            .map_err(|e| BillingError::from_dispatch(e, &format!("product {product_id}")))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, product_id = %product_id), err)]
    pub fn archive_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<Committed<Product>, BillingError> {
        let command = ProductCommand::ArchiveProduct(ArchiveProduct {
            tenant_id,
            product_id,
            occurred_at: now,
        });
        self.dispatcher
            .dispatch(tenant_id, product_id.0, aggregate_types::PRODUCT, &command, make_product)
            .map_err(|e| BillingError::from_dispatch(e, &format!("product {product_id}")))
    }

    // -- invoices -------------------------------------------------------------

    pub fn invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<Invoice, BillingError> {
        let invoice = self.dispatcher.load(tenant_id, invoice_id.0, make_invoice)?;
        if !invoice.exists() {
            return Err(BillingError::not_found(format!("invoice {invoice_id}")));
        }
        Ok(invoice)
    }

    /// Apply catalog and settings defaults and check cross-aggregate references.
    fn resolve_draft(
        &self,
        tenant_id: TenantId,
        draft: &InvoiceDraft,
        defaults: &BillingDefaults,
    ) -> Result<(InvoiceHeader, Vec<LineItem>), BillingError> {
        let client = self.dispatcher.load(tenant_id, draft.client_id.0, make_client)?;
        if client.tenant_id().is_none() {
            return Err(BillingError::Validation(format!(
                "client {} does not exist",
                draft.client_id
            )));
        }
        if !client.can_be_invoiced() {
            return Err(BillingError::InvariantViolation(format!(
                "client {} is archived",
                draft.client_id
            )));
        }

        let mut items = Vec::with_capacity(draft.items.len());
        for (idx, line) in draft.items.iter().enumerate() {
            let title = line
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            let (title, unit_price) = match line.product_id {
                Some(product_id) => {
                    let product = self.dispatcher.load(tenant_id, product_id.0, make_product)?;
                    if product.tenant_id().is_none() {
                        return Err(BillingError::InvalidLineItem(format!(
                            "line {}: product {product_id} does not exist",
                            idx + 1
                        )));
                    }
                    if !product.can_be_sold() {
                        return Err(BillingError::InvalidLineItem(format!(
                            "line {}: product {product_id} is archived",
                            idx + 1
                        )));
                    }
                    (
                        title.unwrap_or_else(|| product.details().name.clone()),
                        line.unit_price.unwrap_or(product.default_price()),
                    )
                }
                None => {
                    let unit_price = line.unit_price.ok_or_else(|| {
                        BillingError::InvalidLineItem(format!("line {}: unit price is required", idx + 1))
                    })?;
                    (title.unwrap_or_default(), unit_price)
                }
            };

            items.push(LineItem {
                title,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price,
                tax_rate: line.tax_rate.unwrap_or(defaults.default_tax_rate),
                discount: line.discount,
            });
        }

        let header = InvoiceHeader {
            client_id: draft.client_id,
            issue_date: draft.issue_date,
            due_date: draft.due_date,
            currency: draft
                .currency
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| defaults.default_currency.clone()),
            notes: draft.notes.clone(),
            terms: draft.terms.clone(),
        };
        Ok((header, items))
    }

    /// Reserve the next invoice number and create the invoice in one commit.
    ///
    /// A concurrent reservation on the same tenant makes the commit stale; the
    /// whole decision is then redone against the fresh counter, so numbers are
    /// never skipped or handed out twice.
    #[instrument(skip(self, draft), fields(tenant_id = %tenant_id, items = draft.items.len()), err)]
    pub fn create_invoice(
        &self,
        tenant_id: TenantId,
        draft: InvoiceDraft,
        now: DateTime<Utc>,
    ) -> Result<Committed<Invoice>, BillingError> {
        let invoice_id = InvoiceId::new(AggregateId::new());
        let settings_id = SettingsId::for_tenant(tenant_id);

        let result = self.with_retries("create_invoice", || {
            let reservation = self.dispatcher.decide(
                tenant_id,
                settings_id.0,
                aggregate_types::SETTINGS,
                &SettingsCommand::ReserveInvoiceNumber(ReserveInvoiceNumber {
                    tenant_id,
                    occurred_at: now,
                }),
                make_settings,
            )?;
            let defaults = reservation.state.defaults();
            let number = InvoiceNumber::new(
                &defaults.numbering_prefix,
                defaults.next_number.saturating_sub(1),
            );

            let (header, items) = self.resolve_draft(tenant_id, &draft, defaults)?;

            let creation = self.dispatcher.decide(
                tenant_id,
                invoice_id.0,
                aggregate_types::INVOICE,
                &InvoiceCommand::CreateInvoice(CreateInvoice {
                    tenant_id,
                    invoice_id,
                    number,
                    header,
                    items,
                    occurred_at: now,
                }),
                make_invoice,
            )?;

            let events = self
                .dispatcher
                .commit(vec![reservation.append, creation.append])?;
            Ok(Committed {
                state: creation.state,
                events,
            })
        });

        match result {
            Ok(committed) => {
                info!(
                    invoice_id = %invoice_id,
                    number = committed.state.number().map(|n| n.as_str()).unwrap_or_default(),
                    "invoice created"
                );
                Ok(committed)
            }
            Err(AttemptError::Stale(msg)) => Err(BillingError::Conflict(format!(
                "invoice number reservation kept conflicting: {msg}"
            ))),
            Err(AttemptError::Failed(e)) => Err(e),
        }
    }

    /// Single-stream invoice command; a lost race is `StaleInvoiceState`.
    fn dispatch_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        command: &InvoiceCommand,
    ) -> Result<Committed<Invoice>, BillingError> {
        self.dispatcher
            .dispatch(tenant_id, invoice_id.0, aggregate_types::INVOICE, command, make_invoice)
            .map_err(|e| match e {
                DispatchError::Concurrency(msg) => BillingError::StaleInvoiceState(msg),
                other => BillingError::from_dispatch(other, &format!("invoice {invoice_id}")),
            })
    }

    #[instrument(skip(self, draft), fields(tenant_id = %tenant_id, invoice_id = %invoice_id), err)]
    pub fn revise_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        draft: InvoiceDraft,
        now: DateTime<Utc>,
    ) -> Result<Committed<Invoice>, BillingError> {
        // Fail on a missing invoice before checking the draft's references.
        self.invoice(tenant_id, invoice_id)?;
        let settings = self.settings(tenant_id)?;
        let (header, items) = self.resolve_draft(tenant_id, &draft, settings.defaults())?;
        let command = InvoiceCommand::ReviseInvoice(ReviseInvoice {
            tenant_id,
            invoice_id,
            header,
            items,
            occurred_at: now,
        });
        self.dispatch_invoice(tenant_id, invoice_id, &command)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id), err)]
    pub fn send_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        now: DateTime<Utc>,
    ) -> Result<Committed<Invoice>, BillingError> {
        let command = InvoiceCommand::SendInvoice(SendInvoice {
            tenant_id,
            invoice_id,
            occurred_at: now,
        });
        self.dispatch_invoice(tenant_id, invoice_id, &command)
    }

    /// Record a payment against the invoice's latest state.
    ///
    /// Each attempt reloads the invoice, so a payment committed concurrently is
    /// always part of the prior `amount_paid`. After `max_retries` lost races the
    /// caller gets `StaleInvoiceState` and nothing is written.
    #[instrument(
        skip(self, payment),
        fields(tenant_id = %tenant_id, invoice_id = %invoice_id, amount = payment.amount.minor()),
        err
    )]
    pub fn record_payment(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        payment: Payment,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Committed<Invoice>, BillingError> {
        let command = InvoiceCommand::RecordPayment(RecordPayment {
            tenant_id,
            invoice_id,
            payment,
            today,
            occurred_at: now,
        });

        let committed = self
            .with_retries("record_payment", || {
                self.dispatcher
                    .dispatch(
                        tenant_id,
                        invoice_id.0,
                        aggregate_types::INVOICE,
                        &command,
                        make_invoice,
                    )
                    .map_err(|e| match e {
                        DispatchError::NotFound => AttemptError::Failed(BillingError::not_found(
                            format!("invoice {invoice_id}"),
                        )),
                        other => other.into(),
                    })
            })
            .map_err(|e| match e {
                AttemptError::Stale(msg) => BillingError::StaleInvoiceState(msg),
                AttemptError::Failed(e) => e,
            })?;

        info!(
            status = %committed.state.status(),
            amount_paid = committed.state.amount_paid().minor(),
            "payment recorded"
        );
        Ok(committed)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id), err)]
    pub fn mark_paid(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        now: DateTime<Utc>,
    ) -> Result<Committed<Invoice>, BillingError> {
        let command = InvoiceCommand::MarkInvoicePaid(MarkInvoicePaid {
            tenant_id,
            invoice_id,
            occurred_at: now,
        });
        self.dispatch_invoice(tenant_id, invoice_id, &command)
    }

    #[instrument(skip(self, reason), fields(tenant_id = %tenant_id, invoice_id = %invoice_id), err)]
    pub fn void_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Committed<Invoice>, BillingError> {
        let command = InvoiceCommand::VoidInvoice(VoidInvoice {
            tenant_id,
            invoice_id,
            reason,
            occurred_at: now,
        });
        self.dispatch_invoice(tenant_id, invoice_id, &command)
    }
}
