use crate::i18n;
use crate::storage::StorageError;
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use tracing::{error, warn};
use uuid::Uuid;

pub(crate) const TRACE_HEADER: &str = "x-trace-id";
pub(crate) const ERROR_CODE_HEADER: &str = "x-error-code";

/// Shape of the JSON error body for one endpoint.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ErrorShape {
    /// Message key used for failures other than an unreachable database.
    pub fallback_key: &'static str,
    /// Carry `"registros": []` so list consumers can render an empty table.
    pub with_records: bool,
    pub expose_detail: bool,
}

pub(crate) fn status_for_storage_error(err: &StorageError) -> StatusCode {
    match err {
        StorageError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StorageError::WriteFailed(_) | StorageError::ReadFailed(_) | StorageError::Schema(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn code_for_storage_error(err: &StorageError) -> &'static str {
    match err {
        StorageError::Unavailable(_) => "STORAGE_UNAVAILABLE",
        StorageError::WriteFailed(_) => "WRITE_FAILED",
        StorageError::ReadFailed(_) => "READ_FAILED",
        StorageError::Schema(_) => "SCHEMA_FAILED",
    }
}

pub fn bad_request(message: impl Into<String>) -> Response {
    let payload = json!({ "error": message.into() });
    error_response(StatusCode::BAD_REQUEST, "INVALID_JSON", payload)
}

/// Maps a gateway error onto its status code and JSON body.
pub(crate) fn storage_error_response(err: &StorageError, shape: ErrorShape) -> Response {
    let status = status_for_storage_error(err);
    let mut body = Map::new();
    match err {
        StorageError::Unavailable(_) => {
            body.insert("error".to_string(), json!(i18n::t("error.db_unavailable")));
        }
        _ => {
            body.insert("error".to_string(), json!(i18n::t(shape.fallback_key)));
            if shape.expose_detail {
                body.insert("detalle".to_string(), json!(err.detail()));
            }
        }
    }
    if shape.with_records {
        body.insert("registros".to_string(), json!([]));
    }
    error_response(status, code_for_storage_error(err), Value::Object(body))
}

/// Attaches the trace/error-code headers and logs the trace id so operators can match
/// a client report to the server log.
pub fn error_response(status: StatusCode, code: &str, payload: Value) -> Response {
    let trace_id = format!("err_{}", Uuid::new_v4().simple());
    if status.is_server_error() {
        error!(trace_id = %trace_id, code, status = status.as_u16(), "request failed");
    } else {
        warn!(trace_id = %trace_id, code, status = status.as_u16(), "request rejected");
    }

    let mut response = (status, Json(payload)).into_response();
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(TRACE_HEADER), value);
    }
    if let Ok(value) = HeaderValue::from_str(code) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(ERROR_CODE_HEADER), value);
    }
    response
}
