use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use invoicekit_core::{normalize_currency_code, TenantId};
use invoicekit_infra::reports::{client_names, dashboard_summary, revenue_report, RevenueQuery};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::today;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/revenue", get(revenue))
}

fn report_currency(
    services: &AppServices,
    tenant_id: TenantId,
    requested: Option<&str>,
) -> Result<String, ApiError> {
    match requested {
        Some(code) => Ok(normalize_currency_code(code)?),
        None => Ok(services.currency(tenant_id)?),
    }
}

pub async fn dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(params): Query<dto::DashboardParams>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    services.hydrate(tenant_id)?;
    let currency = report_currency(&services, tenant_id, params.currency.as_deref())?;

    let read_side = services.read_side();
    let names = client_names(&read_side.clients().list(tenant_id));
    let summary = dashboard_summary(
        &read_side.invoices().list(tenant_id),
        &names,
        &currency,
        params.as_of.unwrap_or_else(today),
    );
    Ok((StatusCode::OK, Json(dto::dashboard_to_json(&summary))).into_response())
}

pub async fn revenue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(params): Query<dto::RevenueParams>,
) -> Result<Response, ApiError> {
    if let (Some(from), Some(to)) = (params.from, params.to) {
        if from > to {
            return Err(ApiError::bad_request(
                "validation_error",
                format!("from ({from}) is after to ({to})"),
            ));
        }
    }

    let tenant_id = tenant.tenant_id();
    services.hydrate(tenant_id)?;
    let currency = report_currency(&services, tenant_id, params.currency.as_deref())?;

    let read_side = services.read_side();
    let names = client_names(&read_side.clients().list(tenant_id));
    let report = revenue_report(
        &read_side.invoices().list(tenant_id),
        &names,
        &currency,
        RevenueQuery {
            from: params.from,
            to: params.to,
        },
    );
    Ok((StatusCode::OK, Json(dto::revenue_to_json(&report))).into_response())
}
