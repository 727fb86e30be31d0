// Dashboard page at `/`: the configured file when present, otherwise the built-in copy.
use crate::config::DashboardConfig;
use crate::state::AppState;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeFile;
use tracing::info;

const EMBEDDED_DASHBOARD: &str = include_str!("../../web/dashboard.html");

pub fn router(config: &DashboardConfig) -> Router<Arc<AppState>> {
    let path = PathBuf::from(config.path.trim());
    if !config.path.trim().is_empty() && path.is_file() {
        info!("serving dashboard from {}", path.display());
        Router::new().route_service("/", ServeFile::new(path))
    } else {
        Router::new().route("/", get(embedded_dashboard))
    }
}

async fn embedded_dashboard() -> Html<&'static str> {
    Html(EMBEDDED_DASHBOARD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_page_polls_the_retrieval_endpoint() {
        assert!(EMBEDDED_DASHBOARD.contains("/api/obtener_registros"));
    }
}
