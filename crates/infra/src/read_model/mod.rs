//! Tenant-isolated read model storage.
//!
//! Read models are disposable: they are rebuilt from the event log on start-up and
//! kept current by projections, so only an in-memory store is provided.

pub mod tenant_store;

pub use tenant_store::{InMemoryTenantStore, TenantStore};
