//! Projection cursors.
//!
//! A cursor is the last applied `sequence_number` per (tenant, aggregate stream,
//! projection). Envelopes at or below the cursor are duplicates from the
//! at-least-once bus and are skipped; an envelope beyond `cursor + 1` means events
//! were missed and the tenant must be rebuilt from the store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value as JsonValue;

use invoicekit_core::{AggregateId, TenantId};
use invoicekit_events::EventEnvelope;

use super::ProjectionError;

/// Cursor persistence, per projection name.
pub trait ProjectionCursorStore: Send + Sync {
    fn get_cursor(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        projection_name: &str,
    ) -> Option<u64>;

    fn update_cursor(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        projection_name: &str,
        sequence_number: u64,
    );

    /// Forget every cursor of a tenant for one projection (rebuilds).
    fn clear_cursors(&self, tenant_id: TenantId, projection_name: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    projection_name: String,
}

#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectionCursorStore for InMemoryCursorStore {
    fn get_cursor(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        projection_name: &str,
    ) -> Option<u64> {
        let cursors = self.cursors.read().ok()?;
        cursors
            .get(&CursorKey {
                tenant_id,
                aggregate_id,
                projection_name: projection_name.to_string(),
            })
            .copied()
    }

    fn update_cursor(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        projection_name: &str,
        sequence_number: u64,
    ) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                CursorKey {
                    tenant_id,
                    aggregate_id,
                    projection_name: projection_name.to_string(),
                },
                sequence_number,
            );
        }
    }

    fn clear_cursors(&self, tenant_id: TenantId, projection_name: &str) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|k, _| !(k.tenant_id == tenant_id && k.projection_name == projection_name));
        }
    }
}

/// Cursor bookkeeping for one projection.
#[derive(Debug)]
pub(crate) struct StreamCursors<C> {
    store: Arc<C>,
    projection_name: &'static str,
}

impl<C: ProjectionCursorStore> StreamCursors<C> {
    pub(crate) fn new(store: Arc<C>, projection_name: &'static str) -> Self {
        Self {
            store,
            projection_name,
        }
    }

    /// `Ok(true)` when the envelope is the next one of its stream.
    pub(crate) fn is_next(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        let last = self
            .store
            .get_cursor(envelope.tenant_id(), envelope.aggregate_id(), self.projection_name)
            .unwrap_or(0);
        let found = envelope.sequence_number();

        if found == 0 {
            return Err(ProjectionError::Gap { last, found });
        }
        if found <= last {
            return Ok(false);
        }
        if found != last + 1 {
            return Err(ProjectionError::Gap { last, found });
        }
        Ok(true)
    }

    pub(crate) fn advance(&self, envelope: &EventEnvelope<JsonValue>) {
        self.store.update_cursor(
            envelope.tenant_id(),
            envelope.aggregate_id(),
            self.projection_name,
            envelope.sequence_number(),
        );
    }

    pub(crate) fn clear(&self, tenant_id: TenantId) {
        self.store.clear_cursors(tenant_id, self.projection_name);
    }
}
