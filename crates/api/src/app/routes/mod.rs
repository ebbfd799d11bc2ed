use axum::Router;
use chrono::{NaiveDate, Utc};

pub mod clients;
pub mod invoices;
pub mod products;
pub mod reports;
pub mod settings;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/clients", clients::router())
        .nest("/products", products::router())
        .nest("/settings", settings::router())
        .nest("/invoices", invoices::router())
        .nest("/reports", reports::router())
}

/// Business date used for status evaluation when the caller gives none.
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}
