//! Projections: event consumers that maintain tenant-isolated read models.
//!
//! All projections are rebuildable from the event log, tenant-isolated, and
//! idempotent under at-least-once delivery (see [`cursor_store`]).

pub mod clients;
pub mod cursor_store;
pub mod invoices;
pub mod products;

use serde_json::Value as JsonValue;
use thiserror::Error;

use invoicekit_core::TenantId;
use invoicekit_events::EventEnvelope;

use crate::event_store::StoredEvent;

pub use clients::{ClientDirectoryProjection, ClientReadModel};
pub use cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
pub use invoices::{InvoiceReadModel, InvoicesProjection};
pub use products::{ProductCatalogProjection, ProductReadModel};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    /// Events were missed; the tenant must be rebuilt from the store.
    #[error("sequence gap in stream (last={last}, found={found})")]
    Gap { last: u64, found: u64 },
    #[error("read model missing for {0}")]
    Missing(String),
}

/// A read-model builder fed from the bus or from a replay.
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Apply one envelope. Envelopes of other aggregate types are ignored.
    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    /// Drop the tenant's read models and cursors.
    fn reset_tenant(&self, tenant_id: TenantId);
}

/// Reset and replay one tenant's full event log through every projection.
pub fn rebuild_tenant(
    projections: &[&dyn Projection],
    tenant_id: TenantId,
    events: &[StoredEvent],
) -> Result<(), ProjectionError> {
    for projection in projections {
        projection.reset_tenant(tenant_id);
    }
    for stored in events {
        if stored.tenant_id != tenant_id {
            return Err(ProjectionError::TenantIsolation(format!(
                "replay for tenant {tenant_id} received an event of tenant {}",
                stored.tenant_id
            )));
        }
        let envelope = stored.to_envelope();
        for projection in projections {
            projection.apply_envelope(&envelope)?;
        }
    }
    Ok(())
}

/// Payload tenant/stream must agree with the envelope.
pub(crate) fn ensure_envelope_matches(
    envelope: &EventEnvelope<JsonValue>,
    event_tenant: TenantId,
    event_aggregate: invoicekit_core::AggregateId,
) -> Result<(), ProjectionError> {
    if event_tenant != envelope.tenant_id() {
        return Err(ProjectionError::TenantIsolation(
            "event tenant_id does not match envelope tenant_id".to_string(),
        ));
    }
    if event_aggregate != envelope.aggregate_id() {
        return Err(ProjectionError::TenantIsolation(
            "event aggregate id does not match envelope aggregate_id".to_string(),
        ));
    }
    Ok(())
}
