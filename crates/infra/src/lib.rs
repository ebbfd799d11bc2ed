//! Infrastructure layer: event store, command dispatch, projections, read-side
//! queries and the application services built on them.

pub mod billing;
pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod read_side;
pub mod reports;

/// Aggregate type tags stored with every event.
pub mod aggregate_types {
    pub const CLIENT: &str = "clients.client";
    pub const PRODUCT: &str = "products.product";
    pub const SETTINGS: &str = "settings.company";
    pub const INVOICE: &str = "invoicing.invoice";
}
