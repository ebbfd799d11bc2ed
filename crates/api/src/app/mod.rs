//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: event store, bus, billing service and read side
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{build_services, AppServices, ServicesError};

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    // Tenant-scoped routes: the tenant header is mandatory.
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn(middleware::tenant_middleware))
            .layer(Extension(services)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}
