// Device ingestion and dashboard retrieval endpoints.
use crate::api::errors::{bad_request, storage_error_response, ErrorShape};
use crate::i18n;
use crate::state::AppState;
use crate::storage::NewServiceCycle;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Fixed retrieval window. Callers cannot ask for more or fewer.
pub const RECENT_RECORDS_LIMIT: i64 = 100;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/registrar_ciclo", post(register_cycle))
        .route("/api/obtener_registros", get(list_records))
}

async fn register_cycle(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let Some(submission) = parse_submission(&body) else {
        return bad_request(i18n::t("error.invalid_json"));
    };
    match state.storage.insert_record(&submission).await {
        Ok(id) => (
            StatusCode::CREATED,
            Json(json!({ "mensaje": i18n::t("message.record_saved"), "id": id })),
        )
            .into_response(),
        Err(err) => storage_error_response(
            &err,
            ErrorShape {
                fallback_key: "error.internal",
                with_records: false,
                expose_detail: state.config.server.expose_error_detail,
            },
        ),
    }
}

async fn list_records(State(state): State<Arc<AppState>>) -> Response {
    match state.storage.fetch_recent(RECENT_RECORDS_LIMIT).await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => storage_error_response(
            &err,
            ErrorShape {
                fallback_key: "error.read_failed",
                with_records: true,
                expose_detail: state.config.server.expose_error_detail,
            },
        ),
    }
}

/// Parses the device payload. `None` means the body is not usable JSON: unparsable,
/// falsy (`null`, `{}`, `[]`, `""`, `0`, `false`) or not an object. Field presence is
/// left to the storage constraints.
fn parse_submission(body: &[u8]) -> Option<NewServiceCycle> {
    let value = serde_json::from_slice::<Value>(body).ok()?;
    if is_falsy(&value) {
        return None;
    }
    let Value::Object(fields) = value else {
        return None;
    };
    Some(NewServiceCycle {
        ciclo_id: parse_i64(&fields, "ciclo_id"),
        duracion_servicio_s: parse_i64(&fields, "duracion_servicio_s"),
        duracion_espera_s: parse_i64(&fields, "duracion_espera_s"),
        finalizacion_tipo: parse_string(&fields, "finalizacion_tipo"),
    })
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(num) => num.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn parse_i64(fields: &Map<String, Value>, key: &str) -> Option<i64> {
    match fields.get(key)? {
        Value::Number(num) => num.as_i64().or_else(|| {
            num.as_f64()
                .filter(|value| value.fract() == 0.0)
                .filter(|value| *value >= i64::MIN as f64 && *value < i64::MAX as f64)
                .map(|value| value as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        Value::Bool(flag) => Some(i64::from(*flag)),
        _ => None,
    }
}

fn parse_string(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(num) => Some(num.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
