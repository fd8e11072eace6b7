use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use acopio_core::AggregateId;
use acopio_infra::services::QualityDecision;
use acopio_quality::QuarantineId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/records", get(list_records))
        .route("/records/:id", get(get_record))
        .route("/records/:id/decision", post(decide_record))
}

#[derive(Debug, Deserialize)]
pub struct RecordFilter {
    pub status: Option<String>,
}

pub async fn list_records(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Query(filter): Query<RecordFilter>,
) -> axum::response::Response {
    let records = match filter.status.as_deref() {
        Some(raw) => {
            let status = match errors::parse_quarantine_status(raw) {
                Ok(s) => s,
                Err(resp) => return resp,
            };
            services
                .projections
                .quarantine
                .list_by_status(tenant.tenant_id(), status)
        }
        None => services.projections.quarantine.list(tenant.tenant_id()),
    };

    let records: Vec<serde_json::Value> = records.into_iter().map(dto::quarantine_to_json).collect();

    (StatusCode::OK, Json(serde_json::json!({ "records": records }))).into_response()
}

pub async fn get_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let quarantine_id = match parse_quarantine_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .projections
        .quarantine
        .get(tenant.tenant_id(), &quarantine_id)
    {
        Some(rm) => (StatusCode::OK, Json(dto::quarantine_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "quarantine record not found"),
    }
}

pub async fn decide_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::DecisionRequest>,
) -> axum::response::Response {
    let quarantine_id = match parse_quarantine_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let decision = QualityDecision {
        kind: body.kind,
        aisle: body.aisle,
        shelf: body.shelf,
        level: body.level,
        remarks: body.remarks,
        certificate_ref: body.certificate_ref,
    };

    match services
        .quality
        .decide(tenant.tenant_id(), quarantine_id, decision)
    {
        Ok(rm) => (StatusCode::OK, Json(dto::quarantine_to_json(rm))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

fn parse_quarantine_id(id: &str) -> Result<QuarantineId, axum::response::Response> {
    let agg: AggregateId = id.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid quarantine record id")
    })?;
    Ok(QuarantineId::new(agg))
}
