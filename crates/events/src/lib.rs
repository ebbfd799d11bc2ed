//! Domain events and their distribution.
//!
//! Billing aggregates emit typed events; infrastructure wraps them in tenant-scoped
//! envelopes and fans them out over an [`EventBus`] to read-model projections.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
