use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use invoicekit_core::TenantId;
use invoicekit_events::EventEnvelope;
use invoicekit_products::{ProductDetails, ProductEvent, ProductId, ProductStatus};

use crate::aggregate_types;
use crate::projections::cursor_store::{InMemoryCursorStore, ProjectionCursorStore, StreamCursors};
use crate::projections::{ensure_envelope_matches, Projection, ProjectionError};
use crate::read_model::{InMemoryTenantStore, TenantStore};

pub const PRODUCT_CATALOG_PROJECTION: &str = "products.catalog";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReadModel {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ProductCatalogProjection<
    S = InMemoryTenantStore<ProductId, ProductReadModel>,
    C = InMemoryCursorStore,
> {
    store: S,
    cursors: StreamCursors<C>,
}

impl<S> ProductCatalogProjection<S>
where
    S: TenantStore<ProductId, ProductReadModel>,
{
    pub fn new(store: S) -> Self {
        Self::with_cursor_store(store, Arc::new(InMemoryCursorStore::new()))
    }
}

impl<S, C> ProductCatalogProjection<S, C>
where
    S: TenantStore<ProductId, ProductReadModel>,
    C: ProjectionCursorStore,
{
    pub fn with_cursor_store(store: S, cursor_store: Arc<C>) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(cursor_store, PRODUCT_CATALOG_PROJECTION),
        }
    }

    pub fn get(&self, tenant_id: TenantId, product_id: &ProductId) -> Option<ProductReadModel> {
        self.store.get(tenant_id, product_id)
    }

    /// Catalog sorted by name.
    pub fn list(&self, tenant_id: TenantId) -> Vec<ProductReadModel> {
        let mut products = self.store.list(tenant_id);
        products.sort_by(|a, b| {
            a.details
                .name
                .to_lowercase()
                .cmp(&b.details.name.to_lowercase())
        });
        products
    }

    fn apply_event(&self, tenant_id: TenantId, event: ProductEvent) -> Result<(), ProjectionError> {
        let missing = |id: ProductId| ProjectionError::Missing(format!("product {id}"));
        let model = match event {
            ProductEvent::ProductCreated(e) => ProductReadModel {
                product_id: e.product_id,
                details: e.details,
                status: ProductStatus::Active,
                created_at: e.occurred_at,
                updated_at: e.occurred_at,
            },
            ProductEvent::ProductUpdated(e) => {
                let mut rm = self
                    .store
                    .get(tenant_id, &e.product_id)
                    .ok_or_else(|| missing(e.product_id))?;
                rm.details = e.details;
                rm.updated_at = e.occurred_at;
                rm
            }
            ProductEvent::ProductArchived(e) => {
                let mut rm = self
                    .store
                    .get(tenant_id, &e.product_id)
                    .ok_or_else(|| missing(e.product_id))?;
                rm.status = ProductStatus::Archived;
                rm.updated_at = e.occurred_at;
                rm
            }
        };
        self.store.upsert(tenant_id, model.product_id, model);
        Ok(())
    }
}

impl<S, C> Projection for ProductCatalogProjection<S, C>
where
    S: TenantStore<ProductId, ProductReadModel>,
    C: ProjectionCursorStore,
{
    fn name(&self) -> &'static str {
        PRODUCT_CATALOG_PROJECTION
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::PRODUCT {
            return Ok(());
        }
        if !self.cursors.is_next(envelope)? {
            return Ok(());
        }

        let event: ProductEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
        ensure_envelope_matches(envelope, event.tenant_id(), event.product_id().0)?;

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

    use invoicekit_core::{AggregateId, Money};
    use invoicekit_products::{ProductArchived, ProductCreated};
    use uuid::Uuid;

    fn envelope(tenant_id: TenantId, product_id: ProductId, seq: u64, event: ProductEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            product_id.0,
            aggregate_types::PRODUCT,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    #[test]
    fn catalog_follows_product_lifecycle() {
        let p = ProductCatalogProjection::new(InMemoryTenantStore::new());
        let tenant = TenantId::new();
        let id = ProductId::new(AggregateId::new());

        p.apply_envelope(&envelope(
            tenant,
            id,
            1,
            ProductEvent::ProductCreated(ProductCreated {
                tenant_id: tenant,
                product_id: id,
                details: ProductDetails {
                    name: "Widget".to_string(),
                    description: None,
                    unit: Some("pcs".to_string()),
                    default_price: Money::from_minor(1500),
                },
                occurred_at: Utc::now(),
            }),
        ))
        .unwrap();
        assert_eq!(p.get(tenant, &id).unwrap().details.default_price, Money::from_minor(1500));

        p.apply_envelope(&envelope(
            tenant,
            id,
            2,
            ProductEvent::ProductArchived(ProductArchived {
                tenant_id: tenant,
                product_id: id,
                occurred_at: Utc::now(),
            }),
        ))
        .unwrap();
        assert_eq!(p.get(tenant, &id).unwrap().status, ProductStatus::Archived);
        assert!(p.list(TenantId::new()).is_empty());
    }
}
