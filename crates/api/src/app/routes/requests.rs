use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use acopio_core::AggregateId;
use acopio_infra::services::{RequestLineSubmission, RequestSubmission};
use acopio_materials::MaterialId;
use acopio_requests::{BudgetItemId, ProjectId, RequestId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(file_request).get(list_requests))
        .route("/:id", get(get_request))
        .route("/:id/dispatch", post(dispatch_request))
}

pub async fn file_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Json(body): Json<dto::FileRequestRequest>,
) -> axum::response::Response {
    let project_id = match parse_id(&body.project_id, "invalid project id") {
        Ok(agg) => ProjectId::new(agg),
        Err(resp) => return resp,
    };

    let budget_item_id = match body.budget_item_id.as_deref() {
        Some(raw) => match parse_id(raw, "invalid budget item id") {
            Ok(agg) => Some(BudgetItemId::new(agg)),
            Err(resp) => return resp,
        },
        None => None,
    };

    let mut lines = Vec::with_capacity(body.lines.len());
    for l in body.lines {
        let material_id = match parse_id(&l.material_id, "invalid material id") {
            Ok(agg) => MaterialId::new(agg),
            Err(resp) => return resp,
        };
        lines.push(RequestLineSubmission {
            material_id,
            quantity: l.quantity,
        });
    }

    let submission = RequestSubmission {
        project_id,
        budget_item_id,
        requester: body.requester,
        request_type: body.request_type,
        lines,
    };

    match services.requests.file_request(tenant.tenant_id(), submission) {
        Ok(filed) => (StatusCode::CREATED, Json(dto::filed_request_to_json(filed))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
) -> axum::response::Response {
    let requests: Vec<serde_json::Value> = services
        .projections
        .requests
        .list(tenant.tenant_id())
        .into_iter()
        .map(dto::request_to_json)
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "requests": requests }))).into_response()
}

pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request_id = match parse_id(&id, "invalid request id") {
        Ok(agg) => RequestId::new(agg),
        Err(resp) => return resp,
    };

    match services.projections.requests.get(tenant.tenant_id(), &request_id) {
        Some(rm) => (StatusCode::OK, Json(dto::request_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "request not found"),
    }
}

pub async fn dispatch_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request_id = match parse_id(&id, "invalid request id") {
        Ok(agg) => RequestId::new(agg),
        Err(resp) => return resp,
    };

    match services.requests.dispatch_request(tenant.tenant_id(), request_id) {
        Ok(rm) => (StatusCode::OK, Json(dto::request_to_json(rm))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

fn parse_id(id: &str, message: &'static str) -> Result<AggregateId, axum::response::Response> {
    id.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", message))
}
