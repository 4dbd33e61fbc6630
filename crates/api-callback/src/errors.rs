use axum::http::StatusCode;
use axum::response::IntoResponse;
use rankflow_core::error::AppError;
use serde_json::json;

pub fn app_error_to_response(err: AppError) -> axum::response::Response {
    match err {
        AppError::InvalidSignature => {
            json_error(StatusCode::UNAUTHORIZED, "invalid_signature", err.to_string())
        }
        AppError::UnknownJob(_) | AppError::NotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "unknown_job", err.to_string())
        }
        AppError::Validation(_) | AppError::InvalidPayload(_) | AppError::Serialization(_) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
        }
        other => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            other.to_string(),
        ),
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
