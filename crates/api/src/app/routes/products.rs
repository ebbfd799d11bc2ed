use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::Value as JsonValue;

use invoicekit_core::TenantId;
use invoicekit_products::ProductId;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/:id", get(get_product).put(update_product))
        .route("/:id/archive", post(archive_product))
}

fn product_view(
    services: &AppServices,
    tenant_id: TenantId,
    product_id: ProductId,
) -> Result<JsonValue, ApiError> {
    let currency = services.currency(tenant_id)?;
    services
        .read_side()
        .products()
        .get(tenant_id, &product_id)
        .map(|rm| dto::product_to_json(rm, &currency))
        .ok_or_else(|| ApiError::not_found(format!("product {product_id}")))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::ProductRequest>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    let committed = services
        .billing()
        .create_product(tenant_id, body.into_details()?, Utc::now())?;
    services.project(tenant_id, &committed.events)?;

    let view = product_view(&services, tenant_id, committed.state.id_typed())?;
    Ok((StatusCode::CREATED, Json(view)).into_response())
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    services.hydrate(tenant_id)?;
    let currency = services.currency(tenant_id)?;
    let items = services
        .read_side()
        .products()
        .list(tenant_id)
        .into_iter()
        .map(|rm| dto::product_to_json(rm, &currency))
        .collect::<Vec<_>>();
    Ok((StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response())
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let product_id = ProductId::new(dto::parse_id(&id, "product")?);
    services.hydrate(tenant.tenant_id())?;
    let view = product_view(&services, tenant.tenant_id(), product_id)?;
    Ok((StatusCode::OK, Json(view)).into_response())
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ProductRequest>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    let product_id = ProductId::new(dto::parse_id(&id, "product")?);
    let committed = services
        .billing()
        .update_product(tenant_id, product_id, body.into_details()?, Utc::now())?;
    services.project(tenant_id, &committed.events)?;

    let view = product_view(&services, tenant_id, product_id)?;
    Ok((StatusCode::OK, Json(view)).into_response())
}

pub async fn archive_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    let product_id = ProductId::new(dto::parse_id(&id, "product")?);
    let committed = services
        .billing()
        .archive_product(tenant_id, product_id, Utc::now())?;
    services.project(tenant_id, &committed.events)?;

    let view = product_view(&services, tenant_id, product_id)?;
    Ok((StatusCode::OK, Json(view)).into_response())
}
