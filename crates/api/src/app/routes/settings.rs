use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new().route("/", get(get_settings).put(update_settings))
}

pub async fn get_settings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Response, ApiError> {
    let settings = services.billing().settings(tenant.tenant_id())?;
    Ok((StatusCode::OK, Json(dto::settings_to_json(&settings))).into_response())
}

/// Merges the given fields over the current settings. Moving `next_number`
/// backwards is rejected by the settings aggregate.
pub async fn update_settings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::SettingsRequest>,
) -> Result<Response, ApiError> {
    let tenant_id = tenant.tenant_id();
    let current = services.billing().settings(tenant_id)?;
    let (profile, defaults) = body.merge_into(&current)?;

    let committed = services
        .billing()
        .configure_settings(tenant_id, profile, defaults, Utc::now())?;
    Ok((StatusCode::OK, Json(dto::settings_to_json(&committed.state))).into_response())
}
