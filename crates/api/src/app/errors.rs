use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use acopio_core::DomainError;
use acopio_extraction::ExtractionError;
use acopio_infra::command_dispatcher::DispatchError;
use acopio_quality::QuarantineStatus;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::TenantIsolation(msg) => json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg),
        DispatchError::Domain(e) => domain_error_to_response(e),
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        DomainError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        DomainError::InvalidId(_) => json_error(StatusCode::BAD_REQUEST, "invalid_id", message),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", message),
        DomainError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        DomainError::AlreadyResolved => json_error(StatusCode::CONFLICT, "already_resolved", message),
        DomainError::InsufficientStock { .. } => {
            json_error(StatusCode::CONFLICT, "insufficient_stock", message)
        }
        DomainError::InvariantViolation(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", message)
        }
        DomainError::MissingRemarks => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "missing_remarks", message)
        }
        DomainError::IncompleteLocation => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "incomplete_location", message)
        }
        DomainError::MissingCertificate => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "missing_certificate", message)
        }
    }
}

pub fn extraction_error_to_response(err: ExtractionError) -> axum::response::Response {
    match err {
        ExtractionError::Unavailable => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "extractor_unavailable",
            "no extraction backend is configured",
        ),
        ExtractionError::Failed(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "extraction_failed", msg)
        }
        ExtractionError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_quarantine_status(s: &str) -> Result<QuarantineStatus, axum::response::Response> {
    match s.to_uppercase().as_str() {
        "PENDING" => Ok(QuarantineStatus::Pending),
        "RELEASED_GOOD" => Ok(QuarantineStatus::ReleasedGood),
        "RELEASED_WITH_OBSERVATIONS" => Ok(QuarantineStatus::ReleasedWithObservations),
        "RETURNED" => Ok(QuarantineStatus::Returned),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_status",
            "status must be one of: PENDING, RELEASED_GOOD, RELEASED_WITH_OBSERVATIONS, RETURNED",
        )),
    }
}
