use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use acopio_core::AggregateId;
use acopio_procurement::DocumentId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/documents", post(submit_document).get(list_documents))
        .route("/documents/:id", get(get_document))
        .route("/documents/:id/confirm", post(confirm_document))
        .route("/documents/:id/discard", post(discard_document))
        .route("/extractions", post(extract_document))
}

pub async fn submit_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Json(body): Json<dto::SubmitDocumentRequest>,
) -> axum::response::Response {
    let (submission, acknowledge_duplicate) = body.into_submission();

    let outcome = match services
        .intake
        .submit_purchase(tenant.tenant_id(), submission, acknowledge_duplicate)
    {
        Ok(o) => o,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    let (parked, json) = dto::submit_outcome_to_json(outcome);
    let status = if parked {
        // Nothing was written; the caller confirms or discards the draft.
        StatusCode::CONFLICT
    } else {
        StatusCode::CREATED
    };

    (status, Json(json)).into_response()
}

pub async fn confirm_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let pending_id = match parse_document_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.intake.confirm_duplicate(tenant.tenant_id(), pending_id) {
        Ok(receipt) => (StatusCode::CREATED, Json(dto::receipt_to_json(receipt))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn discard_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let pending_id = match parse_document_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if services.intake.discard_pending(tenant.tenant_id(), pending_id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        errors::json_error(StatusCode::NOT_FOUND, "not_found", "no parked draft under this id")
    }
}

pub async fn list_documents(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
) -> axum::response::Response {
    let documents: Vec<serde_json::Value> = services
        .projections
        .documents
        .list(tenant.tenant_id())
        .into_iter()
        .map(dto::document_to_json)
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "documents": documents }))).into_response()
}

pub async fn get_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let document_id = match parse_document_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.projections.documents.get(tenant.tenant_id(), &document_id) {
        Some(rm) => (StatusCode::OK, Json(dto::document_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "document not found"),
    }
}

pub async fn extract_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Query(params): Query<dto::ExtractionParams>,
    body: Bytes,
) -> axum::response::Response {
    if body.is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "empty_scan", "scan body is empty");
    }

    match services
        .intake
        .extract_draft(tenant.tenant_id(), &params.file_name, body.to_vec())
        .await
    {
        Ok((document_url, draft)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "document_url": document_url,
                "draft": dto::draft_to_json(draft),
            })),
        )
            .into_response(),
        Err(e) => errors::extraction_error_to_response(e),
    }
}

fn parse_document_id(id: &str) -> Result<DocumentId, axum::response::Response> {
    let agg: AggregateId = id.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid document id")
    })?;
    Ok(DocumentId::new(agg))
}
