//! Append-only event store boundary.
//!
//! Tenant-scoped streams with optimistic concurrency and all-or-nothing
//! multi-stream commits. The in-memory store backs tests and dev; the Postgres
//! store is compiled with the `postgres` feature.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
