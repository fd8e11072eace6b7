use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use acopio_core::AggregateId;
use acopio_infra::services::MovementRequest;
use acopio_materials::MaterialId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/movements", post(post_movement))
        .route("/transfers", post(post_transfer))
        .route("/materials", get(list_materials))
        .route("/materials/:id", get(get_material))
        .route("/materials/:id/kardex", get(get_kardex))
}

pub async fn post_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Json(body): Json<dto::PostMovementRequest>,
) -> axum::response::Response {
    let material_id = match parse_material_id(&body.material_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let movement = MovementRequest {
        material_id,
        kind: body.kind,
        quantity: body.quantity,
        origin: body.origin,
        destination: body.destination,
        reference: body.reference,
        unit_cost: body.unit_cost,
    };

    match services.stock.post_movement(tenant.tenant_id(), movement) {
        Ok(rm) => (StatusCode::OK, Json(dto::material_to_json(rm))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn post_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Json(body): Json<dto::TransferRequest>,
) -> axum::response::Response {
    let material_id = match parse_material_id(&body.material_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.stock.transfer(
        tenant.tenant_id(),
        material_id,
        body.quantity,
        body.origin,
        body.destination,
        body.reference,
    ) {
        Ok(rm) => (StatusCode::OK, Json(dto::material_to_json(rm))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_materials(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
) -> axum::response::Response {
    let materials: Vec<serde_json::Value> = services
        .projections
        .materials
        .list(tenant.tenant_id())
        .into_iter()
        .map(dto::material_to_json)
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "materials": materials }))).into_response()
}

pub async fn get_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let material_id = match parse_material_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.projections.materials.get(tenant.tenant_id(), &material_id) {
        Some(rm) => (StatusCode::OK, Json(dto::material_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "material not found"),
    }
}

pub async fn get_kardex(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let material_id = match parse_material_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let entries: Vec<serde_json::Value> = services
        .projections
        .kardex
        .list_for_material(tenant.tenant_id(), material_id)
        .into_iter()
        .map(dto::kardex_to_json)
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "entries": entries }))).into_response()
}

fn parse_material_id(id: &str) -> Result<MaterialId, axum::response::Response> {
    let agg: AggregateId = id.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid material id")
    })?;
    Ok(MaterialId::new(agg))
}
