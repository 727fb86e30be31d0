// Cross-cutting layers: CORS, request language and panic containment.
use crate::config::CorsConfig;
use crate::i18n;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::FutureExt;
use serde_json::json;
use std::any::Any as StdAny;
use std::panic::AssertUnwindSafe;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tracing::error;

pub const LANGUAGE_HEADER: &str = "x-semaforo-language";

/// Translates the CORS section into tower-http rules. Absent lists allow everything,
/// since the device and the dashboard usually sit on other hosts.
pub fn build_cors(config: &CorsConfig) -> CorsLayer {
    let mut cors = CorsLayer::new();
    let mut wildcard = false;

    match wildcard_or_list(config.allow_origins.as_deref()) {
        Allowed::Any => {
            wildcard = true;
            cors = cors.allow_origin(Any);
        }
        Allowed::List(origins) => {
            let values = origins
                .iter()
                .filter_map(|value| value.parse().ok())
                .collect::<Vec<_>>();
            if !values.is_empty() {
                cors = cors.allow_origin(AllowOrigin::list(values));
            }
        }
    }

    match wildcard_or_list(config.allow_methods.as_deref()) {
        Allowed::Any => {
            wildcard = true;
            cors = cors.allow_methods(Any);
        }
        Allowed::List(methods) => {
            let values = methods
                .iter()
                .filter_map(|value| value.parse().ok())
                .collect::<Vec<_>>();
            if !values.is_empty() {
                cors = cors.allow_methods(AllowMethods::list(values));
            }
        }
    }

    match wildcard_or_list(config.allow_headers.as_deref()) {
        Allowed::Any => {
            wildcard = true;
            cors = cors.allow_headers(Any);
        }
        Allowed::List(headers) => {
            let values = headers
                .iter()
                .filter_map(|value| value.parse().ok())
                .collect::<Vec<_>>();
            if !values.is_empty() {
                cors = cors.allow_headers(AllowHeaders::list(values));
            }
        }
    }

    // tower-http rejects credentials combined with wildcards.
    if config.allow_credentials.unwrap_or(false) && !wildcard {
        cors = cors.allow_credentials(true);
    }

    cors
}

enum Allowed<'a> {
    Any,
    List(&'a [String]),
}

fn wildcard_or_list(values: Option<&[String]>) -> Allowed<'_> {
    match values {
        Some(list) if !list.iter().any(|value| value.trim() == "*") => Allowed::List(list),
        _ => Allowed::Any,
    }
}

/// Scopes the request language so handlers can localize their messages.
pub async fn language_guard(request: Request<Body>, next: Next) -> Response {
    let language = resolve_language_from_request(&request);
    let mut response = i18n::with_language(language.clone(), next.run(request)).await;
    if !response.headers().contains_key("content-language") {
        if let Ok(value) = language.parse() {
            response.headers_mut().insert("content-language", value);
        }
    }
    response
}

pub async fn panic_guard(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let language = resolve_language_from_request(&request);
    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let detail = panic_message(panic.as_ref());
            error!("panic while handling {method} {path}: {detail}");
            let message = i18n::with_language(language, async { i18n::t("error.internal") }).await;
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response()
        }
    }
}

fn panic_message(panic: &(dyn StdAny + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return message.to_string();
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}

fn resolve_language_from_request(request: &Request<Body>) -> String {
    let headers = request.headers();
    let mut candidates: Vec<String> = Vec::new();
    for name in [LANGUAGE_HEADER, "accept-language"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            candidates.push(value.to_string());
        }
    }
    if let Some(query) = request.uri().query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if (key == "lang" || key == "language") && !value.trim().is_empty() {
                candidates.push(value.to_string());
            }
        }
    }
    i18n::resolve_language(candidates.iter().map(|value| value.as_str()))
}
