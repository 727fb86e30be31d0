// HTTP surface: dashboard page plus the ingestion/retrieval API.
pub mod cycles;
pub mod dashboard;
pub mod errors;
pub mod middleware;

use crate::state::AppState;
use axum::middleware::from_fn;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Routes without the outer layers.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(dashboard::router(&state.config.dashboard))
        .merge(cycles::router())
        .with_state(state)
}

/// Full application stack as served by the binary.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = middleware::build_cors(&state.config.cors);
    build_router(state)
        .layer(from_fn(middleware::language_guard))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(middleware::panic_guard))
}
