use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::context::TenantContext;

/// Header carrying the tenant for every domain route.
///
/// Authentication happens upstream (reverse proxy / gateway); by the time a
/// request reaches this service the header is trusted input. A request
/// without it cannot be scoped and is rejected outright.
pub const TENANT_HEADER: &str = "x-tenant-id";

pub async fn tenant_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let tenant_id = extract_tenant(req.headers())?;

    req.extensions_mut().insert(TenantContext::new(tenant_id));

    Ok(next.run(req).await)
}

fn extract_tenant(headers: &HeaderMap) -> Result<acopio_core::TenantId, StatusCode> {
    let header = headers.get(TENANT_HEADER).ok_or(StatusCode::BAD_REQUEST)?;

    let header = header.to_str().map_err(|_| StatusCode::BAD_REQUEST)?;

    let raw = header.trim();
    if raw.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    raw.parse().map_err(|_| StatusCode::BAD_REQUEST)
}
