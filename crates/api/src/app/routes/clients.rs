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

use invoicekit_clients::ClientId;
use invoicekit_core::TenantId;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_client).get(list_clients))
        .route("/:id", get(get_client).put(update_client))
        .route("/:id/archive", post(archive_client))
}

fn client_view(services: &AppServices, tenant_id: TenantId, client_id: ClientId) -> Result<JsonValue, ApiError> {
    services
        .read_side()
        .clients()
        .get(tenant_id, &client_id)
        .map(dto::client_to_json)
        .ok_or_else(|| ApiError::not_found(format!("client {client_id}")))
}

pub async fn register_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::ClientRequest>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    let committed = services
        .billing()
        .register_client(tenant_id, body.into_details(), Utc::now())?;
    services.project(tenant_id, &committed.events)?;

    let view = client_view(&services, tenant_id, committed.state.id_typed())?;
    Ok((StatusCode::CREATED, Json(view)).into_response())
}

pub async fn list_clients(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    services.hydrate(tenant_id)?;
    let items = services
        .read_side()
        .clients()
        .list(tenant_id)
        .into_iter()
        .map(dto::client_to_json)
        .collect::<Vec<_>>();
    Ok((StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response())
}

pub async fn get_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let client_id = ClientId::new(dto::parse_id(&id, "client")?);
    services.hydrate(tenant.tenant_id())?;
    let view = client_view(&services, tenant.tenant_id(), client_id)?;
    Ok((StatusCode::OK, Json(view)).into_response())
}

pub async fn update_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ClientRequest>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    let client_id = ClientId::new(dto::parse_id(&id, "client")?);
    let committed = services
        .billing()
        .update_client(tenant_id, client_id, body.into_details(), Utc::now())?;
    services.project(tenant_id, &committed.events)?;

    let view = client_view(&services, tenant_id, client_id)?;
    Ok((StatusCode::OK, Json(view)).into_response())
}

pub async fn archive_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    let client_id = ClientId::new(dto::parse_id(&id, "client")?);
    let committed = services
        .billing()
        .archive_client(tenant_id, client_id, Utc::now())?;
    services.project(tenant_id, &committed.events)?;

    let view = client_view(&services, tenant_id, client_id)?;
    Ok((StatusCode::OK, Json(view)).into_response())
}
