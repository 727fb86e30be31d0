mod common;

use axum::http::StatusCode;
use common::{
    app_with_store, cycle_payload, post_json, send, sqlite_config, temp_db_path, unreachable_sqlite,
};
use semaforo_telemetry::build_app;
use semaforo_telemetry::config::Config;
use semaforo_telemetry::state::AppState;
use std::sync::Arc;

#[tokio::test]
async fn unreachable_database_starts_degraded_by_default() {
    let (_blocker, storage) = unreachable_sqlite();
    let state = AppState::with_storage(Config::default(), storage);
    assert!(state.prepare_storage().await.is_ok());
}

#[tokio::test]
async fn fail_fast_aborts_startup() {
    let (_blocker, storage) = unreachable_sqlite();
    let mut config = Config::default();
    config.storage.fail_fast_on_schema_error = true;
    let state = AppState::with_storage(config, storage);
    assert!(state.prepare_storage().await.is_err());
}

#[tokio::test]
async fn unknown_backend_is_a_configuration_error() {
    let mut config = Config::default();
    config.storage.backend = "mysql".to_string();
    assert!(AppState::new(config).is_err());
}

#[tokio::test]
async fn server_recovers_once_schema_exists() {
    let db_path = temp_db_path();
    let state = Arc::new(AppState::new(sqlite_config(&db_path)).expect("sqlite state"));
    let app = build_app(state.clone());

    // No schema yet: the write hits a missing table.
    let (status, payload) = send(
        &app,
        post_json("/api/registrar_ciclo", cycle_payload(1, 10, 2, "normal")),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(payload.get("detalle").is_some());

    state.prepare_storage().await.expect("create schema");
    let (status, _) = send(
        &app,
        post_json("/api/registrar_ciclo", cycle_payload(1, 10, 2, "normal")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // A second schema pass on a populated table is a no-op.
    let again = app_with_store(sqlite_config(&db_path), state.storage.clone());
    state.prepare_storage().await.expect("schema is idempotent");
    let (status, _) = send(
        &app,
        post_json("/api/registrar_ciclo", cycle_payload(2, 10, 2, "normal")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(
        &again,
        post_json("/api/registrar_ciclo", cycle_payload(3, 10, 2, "normal")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}
