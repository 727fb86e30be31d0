// SQLite backend: one connection per operation, run on the blocking pool.
use crate::storage::schema::{RECORD_COLUMNS, SQLITE_DDL, TABLE_NAME};
use crate::storage::{
    CycleStore, NewServiceCycle, RecordId, ServiceCycleRecord, StorageError, TIMESTAMP_FORMAT,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const PRAGMAS: [(&str, &str); 2] = [("journal_mode", "WAL"), ("synchronous", "NORMAL")];

pub struct SqliteStorage {
    db_path: PathBuf,
}

impl SqliteStorage {
    pub fn new(db_path: String) -> Self {
        let path = if db_path.trim().is_empty() {
            PathBuf::from("./data/semaforo.db")
        } else {
            PathBuf::from(db_path)
        };
        Self { db_path: path }
    }

    /// Opens a fresh connection on the blocking pool and hands it to `op`. The
    /// connection is dropped (closed) when `op` returns, whatever the outcome.
    async fn with_connection<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            op(&conn)
        })
        .await
        .map_err(|err| StorageError::Unavailable(format!("sqlite worker aborted: {err}")))?
    }
}

fn open(db_path: &Path) -> Result<Connection, StorageError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| unavailable(db_path, err))?;
    }
    let conn = Connection::open(db_path).map_err(|err| unavailable(db_path, err))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|err| unavailable(db_path, err))?;
    apply_pragmas(&conn, db_path);
    Ok(conn)
}

/// Tuning pragmas are best effort: a failure is logged and the connection is still
/// used. Returns the names of the pragmas that could not be applied.
fn apply_pragmas(conn: &Connection, db_path: &Path) -> Vec<&'static str> {
    let mut failed = Vec::new();
    for (pragma, value) in PRAGMAS {
        if let Err(err) = conn.pragma_update(None, pragma, value) {
            warn!(
                "cannot set {pragma}={value} on sqlite database {}: {err}",
                db_path.display()
            );
            failed.push(pragma);
        }
    }
    failed
}

fn unavailable(db_path: &Path, err: impl std::fmt::Display) -> StorageError {
    warn!("cannot open sqlite database {}: {err}", db_path.display());
    StorageError::Unavailable(err.to_string())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ServiceCycleRecord> {
    let raw_timestamp: String = row.get(1)?;
    let timestamp = NaiveDateTime::parse_from_str(&raw_timestamp, TIMESTAMP_FORMAT).map_err(
        |err| rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(err)),
    )?;
    Ok(ServiceCycleRecord {
        id: row.get(0)?,
        timestamp,
        ciclo_id: row.get(2)?,
        duracion_servicio_s: row.get(3)?,
        duracion_espera_s: row.get(4)?,
        finalizacion_tipo: row.get(5)?,
    })
}

#[async_trait]
impl CycleStore for SqliteStorage {
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        self.with_connection(|conn| {
            conn.execute_batch(SQLITE_DDL).map_err(|err| {
                error!("failed to create table {TABLE_NAME}: {err}");
                StorageError::Schema(err.to_string())
            })?;
            info!("table {TABLE_NAME} ready");
            Ok(())
        })
        .await
    }

    async fn insert_record(&self, record: &NewServiceCycle) -> Result<RecordId, StorageError> {
        let record = record.clone();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO registros_servicio \
                 (timestamp, ciclo_id, duracion_servicio_s, duracion_espera_s, finalizacion_tipo) \
                 VALUES (strftime('%Y-%m-%dT%H:%M:%f', 'now'), ?1, ?2, ?3, ?4)",
                params![
                    record.ciclo_id,
                    record.duracion_servicio_s,
                    record.duracion_espera_s,
                    record.finalizacion_tipo,
                ],
            )
            .map_err(|err| {
                error!("failed to insert cycle record: {err}");
                StorageError::WriteFailed(err.to_string())
            })?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn fetch_recent(&self, limit: i64) -> Result<Vec<ServiceCycleRecord>, StorageError> {
        self.with_connection(move |conn| {
            let read_failed = |err: rusqlite::Error| {
                error!("failed to read cycle records: {err}");
                StorageError::ReadFailed(err.to_string())
            };
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM {TABLE_NAME} \
                 ORDER BY timestamp DESC, id DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql).map_err(read_failed)?;
            let rows = stmt
                .query_map(params![limit.max(0)], record_from_row)
                .map_err(read_failed)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(read_failed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::COMPLETION_TYPE_MAX_LEN;

    fn temp_storage() -> SqliteStorage {
        let db_path = std::env::temp_dir().join(format!(
            "semaforo_sqlite_{}.db",
            uuid::Uuid::new_v4().simple()
        ));
        SqliteStorage::new(db_path.to_string_lossy().to_string())
    }

    fn cycle(ciclo_id: i64, tag: &str) -> NewServiceCycle {
        NewServiceCycle {
            ciclo_id: Some(ciclo_id),
            duracion_servicio_s: Some(30),
            duracion_espera_s: Some(5),
            finalizacion_tipo: Some(tag.to_string()),
        }
    }

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let storage = temp_storage();
        storage.ensure_schema().await.unwrap();
        storage.ensure_schema().await.unwrap();
        assert!(storage.fetch_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids_and_reads_newest_first() {
        let storage = temp_storage();
        storage.ensure_schema().await.unwrap();
        let first = storage.insert_record(&cycle(1, "normal")).await.unwrap();
        let second = storage.insert_record(&cycle(2, "forzado")).await.unwrap();
        assert!(second > first);

        let records = storage.fetch_recent(10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, second);
        assert_eq!(records[0].ciclo_id, 2);
        assert_eq!(records[0].finalizacion_tipo, "forzado");
        assert_eq!(records[1].id, first);
        assert!(records[0].timestamp >= records[1].timestamp);
    }

    #[tokio::test]
    async fn fetch_recent_honours_limit() {
        let storage = temp_storage();
        storage.ensure_schema().await.unwrap();
        for ciclo_id in 0..5 {
            storage.insert_record(&cycle(ciclo_id, "normal")).await.unwrap();
        }
        let records = storage.fetch_recent(3).await.unwrap();
        let ids: Vec<i64> = records.iter().map(|record| record.ciclo_id).collect();
        assert_eq!(ids, vec![4, 3, 2]);
    }

    #[tokio::test]
    async fn missing_field_is_a_write_failure() {
        let storage = temp_storage();
        storage.ensure_schema().await.unwrap();
        let mut incomplete = cycle(9, "normal");
        incomplete.duracion_espera_s = None;
        let err = storage.insert_record(&incomplete).await.unwrap_err();
        assert!(matches!(err, StorageError::WriteFailed(_)));
        assert!(storage.fetch_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overlong_completion_type_is_rejected() {
        let storage = temp_storage();
        storage.ensure_schema().await.unwrap();
        let tag = "x".repeat(COMPLETION_TYPE_MAX_LEN + 1);
        let err = storage.insert_record(&cycle(1, &tag)).await.unwrap_err();
        assert!(matches!(err, StorageError::WriteFailed(_)));
    }

    #[tokio::test]
    async fn missing_table_surfaces_as_typed_errors() {
        let storage = temp_storage();
        let write = storage.insert_record(&cycle(1, "normal")).await.unwrap_err();
        assert!(matches!(write, StorageError::WriteFailed(_)));
        let read = storage.fetch_recent(10).await.unwrap_err();
        assert!(matches!(read, StorageError::ReadFailed(_)));
    }

    #[test]
    fn pragma_failures_are_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("semaforo.db");
        let conn = Connection::open(&db_path).unwrap();
        assert!(apply_pragmas(&conn, &db_path).is_empty());

        let other_path = dir.path().join("in_transaction.db");
        let conn = Connection::open(&other_path).unwrap();
        conn.execute_batch("BEGIN; CREATE TABLE pending (x INTEGER);")
            .unwrap();
        // Neither pragma may change inside an open transaction.
        assert_eq!(
            apply_pragmas(&conn, &other_path),
            vec!["journal_mode", "synchronous"]
        );
        conn.execute_batch("COMMIT;").unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM pending", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn unreachable_path_is_unavailable() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let db_path = blocker.path().join("nested").join("semaforo.db");
        let storage = SqliteStorage::new(db_path.to_string_lossy().to_string());
        let err = storage.insert_record(&cycle(1, "normal")).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        let err = storage.fetch_recent(10).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }
}
