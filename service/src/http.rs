//! HTTP surface.
//!
//! Bodies are read as raw bytes and parsed here, so malformed JSON is
//! reported like any other unexpected failure (500 with the generic
//! message) instead of an extractor rejection.

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use serde_json::Value;

use crate::errors::{DiagnosisError, ErrorCategory, MSG_SAVE_FAILED};
use crate::pipeline::DiagnosisService;
use crate::protocol::ApiEnvelope;

pub const FORWARDED_FOR: &str = "x-forwarded-for";

pub fn build_router(service: DiagnosisService) -> Router {
    Router::new()
        .route("/api/diagnosis", post(diagnosis_handler))
        .route("/api/request-detail", post(request_detail_handler))
        .route("/health", get(health_handler))
        .with_state(service)
}

async fn diagnosis_handler(
    State(service): State<DiagnosisService>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let forwarded_for = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok());
    let result = match parse_body(&body) {
        Ok(value) => service.submit_diagnosis(value, forwarded_for).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(strategy) => respond(StatusCode::OK, ApiEnvelope::ok(strategy)),
        Err(err) => {
            log_failure("/api/diagnosis", &err);
            error_response(&err)
        }
    }
}

async fn request_detail_handler(
    State(service): State<DiagnosisService>,
    body: Bytes,
) -> Response {
    let result = match parse_body(&body) {
        Ok(value) => service.submit_detail_request(value).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(_) => respond(StatusCode::OK, ApiEnvelope::empty()),
        Err(err) => {
            log_failure("/api/request-detail", &err);
            // Every failure on this path is reported as a save failure.
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiEnvelope::<()>::failure(MSG_SAVE_FAILED),
            )
        }
    }
}

async fn health_handler() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn parse_body(body: &Bytes) -> Result<Value, DiagnosisError> {
    serde_json::from_slice(body)
        .map_err(|e| DiagnosisError::Internal(format!("invalid json body: {e}")))
}

fn error_response(err: &DiagnosisError) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    respond(status, ApiEnvelope::<()>::failure(err.public_message()))
}

fn respond<T: Serialize>(status: StatusCode, envelope: ApiEnvelope<T>) -> Response {
    (status, Json(envelope)).into_response()
}

fn log_failure(route: &str, err: &DiagnosisError) {
    let status = err.status();
    let category = err.category().as_str();
    match err.category() {
        ErrorCategory::Validation => {
            tracing::info!(route, status, category, "request rejected: {err}");
        }
        ErrorCategory::Generation => {
            tracing::warn!(route, status, category, "generation failed: {err}");
        }
        ErrorCategory::Persistence | ErrorCategory::Internal => {
            tracing::error!(route, status, category, "request failed: {err}");
        }
    }
}
