#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use semaforo_telemetry::build_app;
use semaforo_telemetry::config::Config;
use semaforo_telemetry::state::AppState;
use semaforo_telemetry::storage::{
    CycleStore, NewServiceCycle, RecordId, ServiceCycleRecord, SqliteStorage, StorageError,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::util::ServiceExt;

pub fn temp_db_path() -> String {
    std::env::temp_dir()
        .join(format!(
            "semaforo_it_{}.db",
            uuid::Uuid::new_v4().simple()
        ))
        .to_string_lossy()
        .to_string()
}

pub fn sqlite_config(db_path: &str) -> Config {
    let mut config = Config::default();
    config.storage.backend = "sqlite".to_string();
    config.storage.db_path = db_path.to_string();
    config
}

/// App over a fresh SQLite file with the schema in place.
pub async fn sqlite_app() -> (Router, Arc<AppState>) {
    let config = sqlite_config(&temp_db_path());
    let state = Arc::new(AppState::new(config).expect("build sqlite state"));
    state.prepare_storage().await.expect("prepare storage");
    (build_app(state.clone()), state)
}

pub fn app_with_store(config: Config, store: Arc<dyn CycleStore>) -> Router {
    build_app(Arc::new(AppState::with_storage(config, store)))
}

pub fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .expect("build request")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

pub async fn send_raw(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.expect("request failed");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    (status, headers, body.to_vec())
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, _, body) = send_raw(app, request).await;
    let payload = serde_json::from_slice(&body).expect("response is JSON");
    (status, payload)
}

pub fn cycle_payload(ciclo_id: i64, servicio: i64, espera: i64, tipo: &str) -> String {
    serde_json::json!({
        "ciclo_id": ciclo_id,
        "duracion_servicio_s": servicio,
        "duracion_espera_s": espera,
        "finalizacion_tipo": tipo,
    })
    .to_string()
}

/// Store that fails every call with a fixed error and counts how often it was reached.
pub struct FailingStore {
    pub error: fn() -> StorageError,
    pub calls: AtomicUsize,
}

impl FailingStore {
    pub fn new(error: fn() -> StorageError) -> Arc<Self> {
        Arc::new(Self {
            error,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CycleStore for FailingStore {
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.error)())
    }

    async fn insert_record(&self, _record: &NewServiceCycle) -> Result<RecordId, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.error)())
    }

    async fn fetch_recent(&self, _limit: i64) -> Result<Vec<ServiceCycleRecord>, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.error)())
    }
}

/// SQLite store whose parent path is a regular file, so every open fails.
pub fn unreachable_sqlite() -> (tempfile::NamedTempFile, Arc<SqliteStorage>) {
    let blocker = tempfile::NamedTempFile::new().expect("create blocker file");
    let db_path = blocker.path().join("nested").join("semaforo.db");
    let storage = Arc::new(SqliteStorage::new(db_path.to_string_lossy().to_string()));
    (blocker, storage)
}
