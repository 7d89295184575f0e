use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use campusops_core::DomainError;
use campusops_infra::ServiceError;
use campusops_lending::LendingError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Unauthenticated => {
            json_error(StatusCode::UNAUTHORIZED, "unauthenticated", err.to_string())
        }
        ServiceError::Forbidden(e) => json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()),
        ServiceError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        ServiceError::Lending(e) => lending_error_to_response(e),
        ServiceError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", err.to_string()),
        ServiceError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal server error")
        }
    }
}

fn lending_error_to_response(err: LendingError) -> axum::response::Response {
    let code = match &err {
        LendingError::IllegalTransition { .. } => "illegal_transition",
        LendingError::NotDeletable { .. } => "not_deletable",
        LendingError::InsufficientInventory { .. } => "insufficient_inventory",
        LendingError::PaymentNotVerified { .. } => "payment_not_verified",
        LendingError::Domain(DomainError::Validation(_)) => "validation_error",
        LendingError::Domain(DomainError::InvalidId(_)) => "invalid_id",
        LendingError::Domain(DomainError::Conflict(_)) => {
            return json_error(StatusCode::CONFLICT, "conflict", err.to_string());
        }
        LendingError::Domain(DomainError::InvariantViolation(_)) => {
            tracing::error!(error = %err, "invariant violated");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal server error",
            );
        }
    };
    json_error(StatusCode::BAD_REQUEST, code, err.to_string())
}

/// `{ "error": <message>, "code": <machine code> }` with the given status.
pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": message.into(),
            "code": code,
        })),
    )
        .into_response()
}
