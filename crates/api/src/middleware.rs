use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use invoicekit_core::TenantId;

use crate::context::TenantContext;

/// Header set by the upstream auth layer once it has authenticated the caller.
pub const TENANT_HEADER: &str = "x-tenant-id";

pub async fn tenant_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let tenant_id = extract_tenant(req.headers())?;
    req.extensions_mut().insert(TenantContext::new(tenant_id));
    Ok(next.run(req).await)
}

fn extract_tenant(headers: &HeaderMap) -> Result<TenantId, StatusCode> {
    let header = headers
        .get(TENANT_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let value = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?.trim();
    if value.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    value.parse::<TenantId>().map_err(|_| StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::HeaderValue;

    #[test]
    fn missing_or_malformed_tenant_is_unauthorized() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_tenant(&headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert(TENANT_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert_eq!(extract_tenant(&headers), Err(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn tenant_header_is_parsed() {
        let tenant_id = TenantId::new();
        let mut headers = HeaderMap::new();
        headers.insert(
            TENANT_HEADER,
            HeaderValue::from_str(&tenant_id.to_string()).unwrap(),
        );
        assert_eq!(extract_tenant(&headers), Ok(tenant_id));
    }
}
