//! The query side as one unit: the three projections plus per-tenant hydration.
//!
//! Envelopes may arrive twice (once from the request that committed them, once
//! from the bus worker) and in any interleaving; all application is serialized
//! behind one lock and deduplicated by the projections' cursors. A tenant's
//! read models are rebuilt from the event log the first time the tenant is
//! touched after start-up, and again whenever a projection reports a gap.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};

use invoicekit_core::TenantId;
use invoicekit_events::EventEnvelope;

use crate::event_store::{EventStore, EventStoreError, StoredEvent};
use crate::projections::{
    rebuild_tenant, ClientDirectoryProjection, InvoicesProjection, ProductCatalogProjection,
    Projection, ProjectionError,
};
use crate::read_model::InMemoryTenantStore;

#[derive(Debug, Error)]
pub enum ReadSideError {
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Store(#[from] EventStoreError),
    #[error("read side lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
pub struct ReadSide {
    invoices: InvoicesProjection,
    clients: ClientDirectoryProjection,
    products: ProductCatalogProjection,
    hydrated: Mutex<HashSet<TenantId>>,
}

impl Default for ReadSide {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadSide {
    pub fn new() -> Self {
        Self {
            invoices: InvoicesProjection::new(InMemoryTenantStore::new()),
            clients: ClientDirectoryProjection::new(InMemoryTenantStore::new()),
            products: ProductCatalogProjection::new(InMemoryTenantStore::new()),
            hydrated: Mutex::new(HashSet::new()),
        }
    }

    pub fn invoices(&self) -> &InvoicesProjection {
        &self.invoices
    }

    pub fn clients(&self) -> &ClientDirectoryProjection {
        &self.clients
    }

    pub fn products(&self) -> &ProductCatalogProjection {
        &self.products
    }

    fn projections(&self) -> [&dyn Projection; 3] {
        [&self.invoices, &self.clients, &self.products]
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashSet<TenantId>>, ReadSideError> {
        self.hydrated.lock().map_err(|_| ReadSideError::Poisoned)
    }

    fn rebuild_locked<S: EventStore + ?Sized>(
        &self,
        hydrated: &mut HashSet<TenantId>,
        store: &S,
        tenant_id: TenantId,
    ) -> Result<(), ReadSideError> {
        let events = store.load_all(tenant_id)?;
        rebuild_tenant(&self.projections(), tenant_id, &events)?;
        hydrated.insert(tenant_id);
        info!(tenant_id = %tenant_id, events = events.len(), "read models rebuilt");
        Ok(())
    }

    /// Make sure the tenant's read models reflect the event log.
    pub fn ensure_tenant<S: EventStore + ?Sized>(
        &self,
        store: &S,
        tenant_id: TenantId,
    ) -> Result<(), ReadSideError> {
        let mut hydrated = self.lock()?;
        if hydrated.contains(&tenant_id) {
            return Ok(());
        }
        self.rebuild_locked(&mut hydrated, store, tenant_id)
    }

    /// Force a rebuild of one tenant.
    pub fn rebuild<S: EventStore + ?Sized>(
        &self,
        store: &S,
        tenant_id: TenantId,
    ) -> Result<(), ReadSideError> {
        let mut hydrated = self.lock()?;
        self.rebuild_locked(&mut hydrated, store, tenant_id)
    }

    /// Apply one committed envelope, rebuilding the tenant if events were missed.
    pub fn apply<S: EventStore + ?Sized>(
        &self,
        store: &S,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ReadSideError> {
        let mut hydrated = self.lock()?;
        let tenant_id = envelope.tenant_id();

        // The log already contains this envelope; the rebuild covers it.
        if !hydrated.contains(&tenant_id) {
            return self.rebuild_locked(&mut hydrated, store, tenant_id);
        }

        for projection in self.projections() {
            match projection.apply_envelope(envelope) {
                Ok(()) => {}
                Err(ProjectionError::Gap { last, found }) => {
                    warn!(
                        projection = projection.name(),
                        tenant_id = %tenant_id,
                        last,
                        found,
                        "projection fell behind; rebuilding tenant"
                    );
                    return self.rebuild_locked(&mut hydrated, store, tenant_id);
                }
                Err(ProjectionError::Missing(what)) => {
                    warn!(projection = projection.name(), %what, "read model missing; rebuilding tenant");
                    return self.rebuild_locked(&mut hydrated, store, tenant_id);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Apply the events returned by a successful commit.
    pub fn apply_committed<S: EventStore + ?Sized>(
        &self,
        store: &S,
        events: &[StoredEvent],
    ) -> Result<(), ReadSideError> {
        for stored in events {
            self.apply(store, &stored.to_envelope())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};

    use invoicekit_clients::ClientDetails;
    use invoicekit_core::{Money, Quantity, TaxRate};
    use invoicekit_events::InMemoryEventBus;

    use crate::billing::{BillingService, InvoiceDraft, LineItemDraft};
    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::InMemoryEventStore;

    fn service() -> BillingService<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>> {
        BillingService::new(
            CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new())),
            3,
        )
    }

    fn draft(client_id: invoicekit_clients::ClientId) -> InvoiceDraft {
        InvoiceDraft {
            client_id,
            issue_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            currency: None,
            notes: None,
            terms: None,
            items: vec![LineItemDraft {
                title: Some("Design".to_string()),
                product_id: None,
                quantity: Quantity::units(1),
                unit_price: Some(Money::from_minor(5000)),
                tax_rate: Some(TaxRate::ZERO),
                discount: Money::ZERO,
            }],
        }
    }

    fn details() -> ClientDetails {
        ClientDetails {
            name: "Acme".to_string(),
            ..ClientDetails::default()
        }
    }

    #[test]
    fn committed_events_are_visible_immediately_and_deduplicated() {
        let svc = service();
        let store = svc.dispatcher().store();
        let read = ReadSide::new();
        let tenant = TenantId::new();
        read.ensure_tenant(store, tenant).unwrap();

        let client = svc.register_client(tenant, details(), Utc::now()).unwrap();
        read.apply_committed(store, &client.events).unwrap();
        let created = svc
            .create_invoice(tenant, draft(client.state.id_typed()), Utc::now())
            .unwrap();
        read.apply_committed(store, &created.events).unwrap();
        // Second delivery, as from the bus.
        read.apply_committed(store, &created.events).unwrap();

        assert_eq!(read.clients().list(tenant).len(), 1);
        let invoices = read.invoices().list(tenant);
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].number, "INV-001");
    }

    #[test]
    fn first_touch_hydrates_from_the_log() {
        let svc = service();
        let store = svc.dispatcher().store();
        let tenant = TenantId::new();
        let client = svc.register_client(tenant, details(), Utc::now()).unwrap();
        svc.create_invoice(tenant, draft(client.state.id_typed()), Utc::now())
            .unwrap();

        let read = ReadSide::new();
        read.ensure_tenant(store, tenant).unwrap();
        assert_eq!(read.invoices().list(tenant).len(), 1);
        assert_eq!(read.clients().list(tenant).len(), 1);
    }

    #[test]
    fn missed_events_trigger_a_rebuild() {
        let svc = service();
        let store = svc.dispatcher().store();
        let read = ReadSide::new();
        let tenant = TenantId::new();
        read.ensure_tenant(store, tenant).unwrap();

        let client = svc.register_client(tenant, details(), Utc::now()).unwrap();
        let client_id = client.state.id_typed();
        // The registration is never delivered; the update arrives first.
        let updated = svc
            .update_client(
                tenant,
                client_id,
                ClientDetails {
                    name: "Acme Ltd".to_string(),
                    ..ClientDetails::default()
                },
                Utc::now(),
            )
            .unwrap();
        read.apply_committed(store, &updated.events).unwrap();

        assert_eq!(read.clients().get(tenant, &client_id).unwrap().details.name, "Acme Ltd");
    }
}
