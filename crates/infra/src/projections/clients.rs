use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use invoicekit_clients::{ClientDetails, ClientEvent, ClientId, ClientStatus};
use invoicekit_core::TenantId;
use invoicekit_events::EventEnvelope;

use crate::aggregate_types;
use crate::projections::cursor_store::{InMemoryCursorStore, ProjectionCursorStore, StreamCursors};
use crate::projections::{ensure_envelope_matches, Projection, ProjectionError};
use crate::read_model::{InMemoryTenantStore, TenantStore};

pub const CLIENT_DIRECTORY_PROJECTION: &str = "clients.directory";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientReadModel {
    pub client_id: ClientId,
    pub details: ClientDetails,
    pub status: ClientStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client directory, per tenant.
#[derive(Debug)]
pub struct ClientDirectoryProjection<
    S = InMemoryTenantStore<ClientId, ClientReadModel>,
    C = InMemoryCursorStore,
> {
    store: S,
    cursors: StreamCursors<C>,
}

impl<S> ClientDirectoryProjection<S>
where
    S: TenantStore<ClientId, ClientReadModel>,
{
    pub fn new(store: S) -> Self {
        Self::with_cursor_store(store, Arc::new(InMemoryCursorStore::new()))
    }
}

impl<S, C> ClientDirectoryProjection<S, C>
where
    S: TenantStore<ClientId, ClientReadModel>,
    C: ProjectionCursorStore,
{
    pub fn with_cursor_store(store: S, cursor_store: Arc<C>) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(cursor_store, CLIENT_DIRECTORY_PROJECTION),
        }
    }

    pub fn get(&self, tenant_id: TenantId, client_id: &ClientId) -> Option<ClientReadModel> {
        self.store.get(tenant_id, client_id)
    }

    /// All clients of a tenant, sorted by name.
    pub fn list(&self, tenant_id: TenantId) -> Vec<ClientReadModel> {
        let mut clients = self.store.list(tenant_id);
        clients.sort_by(|a, b| {
            a.details
                .name
                .to_lowercase()
                .cmp(&b.details.name.to_lowercase())
        });
        clients
    }

    fn apply_event(&self, tenant_id: TenantId, event: ClientEvent) -> Result<(), ProjectionError> {
        let model = match event {
            ClientEvent::ClientRegistered(e) => ClientReadModel {
                client_id: e.client_id,
                details: e.details,
                status: ClientStatus::Active,
                created_at: e.occurred_at,
                updated_at: e.occurred_at,
            },
            ClientEvent::ClientUpdated(e) => {
                let mut rm = self
                    .store
                    .get(tenant_id, &e.client_id)
                    .ok_or_else(|| ProjectionError::Missing(format!("client {}", e.client_id)))?;
                rm.details = e.details;
                rm.updated_at = e.occurred_at;
                rm
            }
            ClientEvent::ClientArchived(e) => {
                let mut rm = self
                    .store
                    .get(tenant_id, &e.client_id)
                    .ok_or_else(|| ProjectionError::Missing(format!("client {}", e.client_id)))?;
                rm.status = ClientStatus::Archived;
                rm.updated_at = e.occurred_at;
                rm
            }
        };
        self.store.upsert(tenant_id, model.client_id, model);
        Ok(())
    }
}

impl<S, C> Projection for ClientDirectoryProjection<S, C>
where
    S: TenantStore<ClientId, ClientReadModel>,
    C: ProjectionCursorStore,
{
    fn name(&self) -> &'static str {
        CLIENT_DIRECTORY_PROJECTION
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::CLIENT {
            return Ok(());
        }
        if !self.cursors.is_next(envelope)? {
            return Ok(());
        }

        let event: ClientEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
        ensure_envelope_matches(envelope, event.tenant_id(), event.client_id().0)?;

        self.apply_event(envelope.tenant_id(), event)?;
        self.cursors.advance(envelope);
        Ok(())
    }

    fn reset_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear(tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use invoicekit_clients::{ClientArchived, ClientRegistered, ClientUpdated};
    use invoicekit_core::AggregateId;
    use uuid::Uuid;

    fn envelope(tenant_id: TenantId, client_id: ClientId, seq: u64, event: ClientEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            client_id.0,
            aggregate_types::CLIENT,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn details(name: &str) -> ClientDetails {
        ClientDetails {
            name: name.to_string(),
            ..ClientDetails::default()
        }
    }

    fn registered(tenant_id: TenantId, client_id: ClientId, name: &str) -> ClientEvent {
        ClientEvent::ClientRegistered(ClientRegistered {
            tenant_id,
            client_id,
            details: details(name),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn tracks_registration_updates_and_archival() {
        let p = ClientDirectoryProjection::new(InMemoryTenantStore::new());
        let tenant = TenantId::new();
        let id = ClientId::new(AggregateId::new());

        p.apply_envelope(&envelope(tenant, id, 1, registered(tenant, id, "Acme"))).unwrap();
        p.apply_envelope(&envelope(
            tenant,
            id,
            2,
            ClientEvent::ClientUpdated(ClientUpdated {
                tenant_id: tenant,
                client_id: id,
                details: details("Acme Traders"),
                occurred_at: Utc::now(),
            }),
        ))
        .unwrap();
        p.apply_envelope(&envelope(
            tenant,
            id,
            3,
            ClientEvent::ClientArchived(ClientArchived {
                tenant_id: tenant,
                client_id: id,
                occurred_at: Utc::now(),
            }),
        ))
        .unwrap();

        let rm = p.get(tenant, &id).unwrap();
        assert_eq!(rm.details.name, "Acme Traders");
        assert_eq!(rm.status, ClientStatus::Archived);
    }

    #[test]
    fn list_is_sorted_and_tenant_scoped() {
        let p = ClientDirectoryProjection::new(InMemoryTenantStore::new());
        let t1 = TenantId::new();
        let t2 = TenantId::new();

        for (tenant, name) in [(t1, "zeta"), (t1, "Alpha"), (t2, "Other")] {
            let id = ClientId::new(AggregateId::new());
            p.apply_envelope(&envelope(tenant, id, 1, registered(tenant, id, name))).unwrap();
        }

        let names: Vec<_> = p.list(t1).into_iter().map(|c| c.details.name).collect();
        assert_eq!(names, vec!["Alpha".to_string(), "zeta".to_string()]);
        assert_eq!(p.list(t2).len(), 1);
    }

    #[test]
    fn update_before_registration_is_a_gap() {
        let p = ClientDirectoryProjection::new(InMemoryTenantStore::new());
        let tenant = TenantId::new();
        let id = ClientId::new(AggregateId::new());

        let err = p
            .apply_envelope(&envelope(
                tenant,
                id,
                2,
                ClientEvent::ClientArchived(ClientArchived {
                    tenant_id: tenant,
                    client_id: id,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap_err();
        assert!(matches!(err, ProjectionError::Gap { last: 0, found: 2 }));
    }
}
