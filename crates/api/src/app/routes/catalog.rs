use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{post, put},
    Json, Router,
};
use chrono::Utc;

use acopio_core::AggregateId;
use acopio_materials::MaterialId;
use acopio_requests::ProjectId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/providers", post(register_provider).get(list_providers))
        .route("/materials", post(register_material))
        .route("/mappings", put(override_mapping))
        .route("/budget-items", post(register_budget_item).get(list_budget_items))
}

pub async fn register_provider(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Json(body): Json<dto::RegisterProviderRequest>,
) -> axum::response::Response {
    match services.identity.register_provider(
        tenant.tenant_id(),
        &body.name,
        &body.tax_id,
        body.contact,
        Utc::now(),
    ) {
        Ok(rm) => (StatusCode::CREATED, Json(dto::provider_to_json(rm))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_providers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
) -> axum::response::Response {
    let providers: Vec<serde_json::Value> = services
        .projections
        .providers
        .list(tenant.tenant_id())
        .into_iter()
        .map(dto::provider_to_json)
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "providers": providers }))).into_response()
}

pub async fn register_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Json(body): Json<dto::RegisterMaterialRequest>,
) -> axum::response::Response {
    match services.identity.register_material(
        tenant.tenant_id(),
        &body.name,
        &body.unit,
        &body.category,
        body.requires_certificate,
        Utc::now(),
    ) {
        Ok(rm) => (StatusCode::CREATED, Json(dto::material_to_json(rm))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn override_mapping(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Json(body): Json<dto::OverrideMappingRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match body.material_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid material id")
        }
    };
    let material_id = MaterialId::new(agg);

    match services
        .identity
        .override_mapping(tenant.tenant_id(), &body.raw_text, material_id, Utc::now())
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn register_budget_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Json(body): Json<dto::RegisterBudgetItemRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match body.project_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid project id")
        }
    };
    let project_id = ProjectId::new(agg);

    match services.requests.register_budget_item(
        tenant.tenant_id(),
        project_id,
        &body.code,
        &body.name,
        body.theoretical_quantity,
    ) {
        Ok(rm) => (StatusCode::CREATED, Json(dto::budget_item_to_json(rm))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_budget_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
) -> axum::response::Response {
    let budget_items: Vec<serde_json::Value> = services
        .projections
        .budget_items
        .list(tenant.tenant_id())
        .into_iter()
        .map(dto::budget_item_to_json)
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "budget_items": budget_items }))).into_response()
}
