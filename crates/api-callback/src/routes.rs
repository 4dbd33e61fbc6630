use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rankflow_core::application::CallbackReconciler;
use rankflow_core::signature::SIGNATURE_HEADER;
use tracing::debug;

use crate::errors::app_error_to_response;

pub fn router(reconciler: Arc<CallbackReconciler>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/callback/:job_id", post(callback))
        .with_state(reconciler)
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// The body is taken as raw bytes so the signature is checked against
/// exactly what the sender signed.
pub async fn callback(
    State(reconciler): State<Arc<CallbackReconciler>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match reconciler.reconcile_raw(&job_id, signature, &body).await {
        Ok(result) => {
            debug!(job_id = %job_id, result = ?result, "Callback reconciled");
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(err) => app_error_to_response(err),
    }
}
