//! Infrastructure wiring: event store, bus, billing service and read side.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use invoicekit_core::TenantId;
use invoicekit_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use invoicekit_infra::{
    billing::{BillingError, BillingService},
    command_dispatcher::CommandDispatcher,
    event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent},
    read_side::{ReadSide, ReadSideError},
};

use crate::config::{ApiConfig, ConfigError, StoreBackend};

pub type SharedStore = Arc<dyn EventStore>;
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Billing = BillingService<SharedStore, SharedBus>;

#[derive(Debug, Error)]
pub enum ServicesError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("event store unavailable: {0}")]
    Store(#[from] EventStoreError),
}

/// Command side and query side sharing one event store.
pub struct AppServices {
    billing: Billing,
    read_side: Arc<ReadSide>,
}

impl AppServices {
    pub fn new(store: SharedStore, max_retries: u32) -> Self {
        let bus: SharedBus = Arc::new(InMemoryEventBus::new());
        let read_side = Arc::new(ReadSide::new());
        spawn_read_side_worker(bus.subscribe(), store.clone(), read_side.clone());

        Self {
            billing: BillingService::new(CommandDispatcher::new(store, bus), max_retries),
            read_side,
        }
    }

    pub fn in_memory(max_retries: u32) -> Self {
        Self::new(Arc::new(InMemoryEventStore::new()), max_retries)
    }

    pub fn billing(&self) -> &Billing {
        &self.billing
    }

    pub fn read_side(&self) -> &ReadSide {
        &self.read_side
    }

    fn store(&self) -> &dyn EventStore {
        self.billing.dispatcher().store().as_ref()
    }

    /// Bring the tenant's read models up to date with the log before a query.
    pub fn hydrate(&self, tenant_id: TenantId) -> Result<(), ReadSideError> {
        self.read_side.ensure_tenant(self.store(), tenant_id)
    }

    /// Apply a command's events right away so the caller reads its own write.
    pub fn project(&self, tenant_id: TenantId, events: &[StoredEvent]) -> Result<(), ReadSideError> {
        match self.read_side.apply_committed(self.store(), events) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, tenant_id = %tenant_id, "applying committed events failed; rebuilding");
                self.read_side.rebuild(self.store(), tenant_id)
            }
        }
    }

    /// The tenant's default currency, used to render catalog and report amounts.
    pub fn currency(&self, tenant_id: TenantId) -> Result<String, BillingError> {
        Ok(self.billing.settings(tenant_id)?.defaults().default_currency.clone())
    }
}

/// Bus subscriber feeding the read side; duplicates of envelopes already
/// applied by the committing request are dropped by the projection cursors.
fn spawn_read_side_worker(
    subscription: Subscription<EventEnvelope<JsonValue>>,
    store: SharedStore,
    read_side: Arc<ReadSide>,
) {
    let spawned = std::thread::Builder::new()
        .name("read-side".to_string())
        .spawn(move || {
            // Ends once the bus, and with it every sender, is dropped.
            while let Ok(envelope) = subscription.recv() {
                if let Err(e) = read_side.apply(store.as_ref(), &envelope) {
                    tracing::warn!(
                        error = %e,
                        tenant_id = %envelope.tenant_id(),
                        aggregate_type = envelope.aggregate_type(),
                        "projection apply failed"
                    );
                }
            }
            tracing::debug!("read side worker stopped");
        });

    if let Err(e) = spawned {
        tracing::warn!(error = %e, "read side worker not started; relying on request-path projection");
    }
}

pub async fn build_services(config: &ApiConfig) -> Result<AppServices, ServicesError> {
    match config.store {
        StoreBackend::Memory => {
            tracing::info!("using in-memory event store");
            Ok(AppServices::in_memory(config.max_retries))
        }
        StoreBackend::Postgres => build_postgres_services(config).await,
    }
}

#[cfg(feature = "postgres")]
async fn build_postgres_services(config: &ApiConfig) -> Result<AppServices, ServicesError> {
    use invoicekit_infra::event_store::PostgresEventStore;

    let url = config
        .database_url
        .as_deref()
        .ok_or(ConfigError::MissingDatabaseUrl(crate::config::DATABASE_URL_ENV))?;
    let store = PostgresEventStore::connect(url).await?;
    tracing::info!("using postgres event store");
    Ok(AppServices::new(Arc::new(store), config.max_retries))
}

#[cfg(not(feature = "postgres"))]
async fn build_postgres_services(_config: &ApiConfig) -> Result<AppServices, ServicesError> {
    Err(ConfigError::PostgresDisabled.into())
}
