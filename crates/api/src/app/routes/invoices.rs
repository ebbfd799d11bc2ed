use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;

use invoicekit_core::TenantId;
use invoicekit_infra::command_dispatcher::Committed;
use invoicekit_infra::reports::{client_names, list_invoices as query_invoices};
use invoicekit_invoicing::{Invoice, InvoiceId};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::today;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route("/:id", get(get_invoice).put(revise_invoice))
        .route("/:id/send", post(send_invoice))
        .route("/:id/payments", post(record_payment))
        .route("/:id/mark-paid", post(mark_paid))
        .route("/:id/void", post(void_invoice))
}

fn invoice_view(
    services: &AppServices,
    tenant_id: TenantId,
    invoice_id: InvoiceId,
    today: NaiveDate,
) -> Result<JsonValue, ApiError> {
    let read_side = services.read_side();
    let invoice = read_side
        .invoices()
        .get(tenant_id, &invoice_id)
        .ok_or_else(|| ApiError::not_found(format!("invoice {invoice_id}")))?;
    let client_name = read_side
        .clients()
        .get(tenant_id, &invoice.client_id)
        .map(|c| c.details.name);
    Ok(dto::invoice_to_json(invoice, client_name, today))
}

/// Project a command's events and render the invoice it produced.
fn committed_view(
    services: &AppServices,
    tenant_id: TenantId,
    committed: Committed<Invoice>,
    status: StatusCode,
) -> Result<Response, ApiError> {
    services.project(tenant_id, &committed.events)?;
    let view = invoice_view(services, tenant_id, committed.state.id_typed(), today())?;
    Ok((status, Json(view)).into_response())
}

pub async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::InvoiceRequest>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    let committed = services
        .billing()
        .create_invoice(tenant_id, body.into_draft()?, Utc::now())?;
    committed_view(&services, tenant_id, committed, StatusCode::CREATED)
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(params): Query<dto::ListInvoicesParams>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    let query = params.to_query()?;
    services.hydrate(tenant_id)?;

    let read_side = services.read_side();
    let names = client_names(&read_side.clients().list(tenant_id));
    let invoices = read_side.invoices().list(tenant_id);
    let page = query_invoices(&invoices, &names, &query, params.as_of.unwrap_or_else(today));
    Ok((StatusCode::OK, Json(dto::page_to_json(&page))).into_response())
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Query(params): Query<dto::AsOfParams>,
) -> Result<Response, ApiError> {
    let invoice_id = dto::invoice_id(&id)?;
    services.hydrate(tenant.tenant_id())?;
    let view = invoice_view(
        &services,
        tenant.tenant_id(),
        invoice_id,
        params.as_of.unwrap_or_else(today),
    )?;
    Ok((StatusCode::OK, Json(view)).into_response())
}

pub async fn revise_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::InvoiceRequest>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    let invoice_id = dto::invoice_id(&id)?;
    let committed = services
        .billing()
        .revise_invoice(tenant_id, invoice_id, body.into_draft()?, Utc::now())?;
    committed_view(&services, tenant_id, committed, StatusCode::OK)
}

pub async fn send_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    let invoice_id = dto::invoice_id(&id)?;
    let committed = services
        .billing()
        .send_invoice(tenant_id, invoice_id, Utc::now())?;
    committed_view(&services, tenant_id, committed, StatusCode::OK)
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PaymentRequest>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    let invoice_id = dto::invoice_id(&id)?;
    let today = today();
    let payment = body.into_payment(today)?;
    let committed = services
        .billing()
        .record_payment(tenant_id, invoice_id, payment, today, Utc::now())?;
    committed_view(&services, tenant_id, committed, StatusCode::CREATED)
}

pub async fn mark_paid(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    let invoice_id = dto::invoice_id(&id)?;
    let committed = services
        .billing()
        .mark_paid(tenant_id, invoice_id, Utc::now())?;
    committed_view(&services, tenant_id, committed, StatusCode::OK)
}

pub async fn void_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::VoidInvoiceRequest>>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    let invoice_id = dto::invoice_id(&id)?;
    let reason = body.and_then(|Json(b)| b.reason);
    let committed = services
        .billing()
        .void_invoice(tenant_id, invoice_id, reason, Utc::now())?;
    committed_view(&services, tenant_id, committed, StatusCode::OK)
}
