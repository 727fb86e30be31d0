// Persistence gateway: one append-only table of service-cycle records behind SQLite/Postgres.

mod postgres;
pub mod schema;
mod sqlite;

use crate::config::StorageConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use thiserror::Error;

pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;

/// Server-assigned primary key of a stored cycle.
pub type RecordId = i64;

/// Timestamps are rendered without an offset; fractional seconds only when present.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// One observed traffic-signal cycle as persisted. Field names double as the JSON keys
/// the dashboard reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceCycleRecord {
    pub id: RecordId,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    pub ciclo_id: i64,
    pub duracion_servicio_s: i64,
    pub duracion_espera_s: i64,
    pub finalizacion_tipo: String,
}

/// Insert payload. Missing fields stay `None` and are bound as SQL NULL, leaving the
/// NOT NULL constraints to reject them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewServiceCycle {
    pub ciclo_id: Option<i64>,
    pub duracion_servicio_s: Option<i64>,
    pub duracion_espera_s: Option<i64>,
    pub finalizacion_tipo: Option<String>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("read failed: {0}")]
    ReadFailed(String),
    #[error("schema creation failed: {0}")]
    Schema(String),
}

impl StorageError {
    /// Underlying error text without the variant prefix, for the `detalle` field.
    pub fn detail(&self) -> &str {
        match self {
            Self::Unavailable(detail)
            | Self::WriteFailed(detail)
            | Self::ReadFailed(detail)
            | Self::Schema(detail) => detail,
        }
    }
}

/// Storage backend abstraction. Every call acquires its own connection and releases it
/// before returning, success or failure.
#[async_trait]
pub trait CycleStore: Send + Sync {
    /// Creates the table when missing; an existing table is not an error.
    async fn ensure_schema(&self) -> Result<(), StorageError>;

    async fn insert_record(&self, record: &NewServiceCycle) -> Result<RecordId, StorageError>;

    /// Up to `limit` records, newest first (timestamp, then id, descending).
    async fn fetch_recent(&self, limit: i64) -> Result<Vec<ServiceCycleRecord>, StorageError>;
}

/// Builds the backend named by `storage.backend`.
pub fn build_storage(config: &StorageConfig) -> Result<Arc<dyn CycleStore>> {
    let backend = config.backend.trim().to_lowercase();
    let backend = if backend.is_empty() {
        "sqlite".to_string()
    } else {
        backend
    };
    match backend.as_str() {
        "sqlite" | "default" => Ok(Arc::new(SqliteStorage::new(
            config.db_path.trim().to_string(),
        ))),
        "postgres" | "postgresql" | "pg" => Ok(Arc::new(PostgresStorage::new(&config.postgres)?)),
        other => Err(anyhow!("unknown storage backend: {other}")),
    }
}

fn serialize_timestamp<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PostgresConfig;
    use chrono::NaiveDate;
    use serde_json::json;

    fn sample_record(micros: u32) -> ServiceCycleRecord {
        let timestamp = NaiveDate::from_ymd_opt(2024, 5, 17)
            .and_then(|date| date.and_hms_micro_opt(8, 30, 5, micros))
            .expect("valid timestamp");
        ServiceCycleRecord {
            id: 3,
            timestamp,
            ciclo_id: 7,
            duracion_servicio_s: 30,
            duracion_espera_s: 5,
            finalizacion_tipo: "normal".to_string(),
        }
    }

    #[test]
    fn record_serializes_with_iso_timestamp() {
        let value = serde_json::to_value(sample_record(0)).expect("serialize record");
        assert_eq!(
            value,
            json!({
                "id": 3,
                "timestamp": "2024-05-17T08:30:05",
                "ciclo_id": 7,
                "duracion_servicio_s": 30,
                "duracion_espera_s": 5,
                "finalizacion_tipo": "normal",
            })
        );
    }

    #[test]
    fn fractional_seconds_are_kept_when_present() {
        let value = serde_json::to_value(sample_record(250_000)).expect("serialize record");
        assert_eq!(value["timestamp"], json!("2024-05-17T08:30:05.250"));
    }

    #[test]
    fn detail_strips_variant_prefix() {
        let err = StorageError::WriteFailed("NOT NULL constraint failed".to_string());
        assert_eq!(err.detail(), "NOT NULL constraint failed");
        assert_eq!(err.to_string(), "write failed: NOT NULL constraint failed");
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let config = StorageConfig {
            backend: "mysql".to_string(),
            ..StorageConfig::default()
        };
        let err = build_storage(&config).err().expect("backend should be rejected");
        assert!(err.to_string().contains("mysql"));
    }

    #[test]
    fn postgres_backend_requires_connection_settings() {
        let config = StorageConfig {
            backend: "pg".to_string(),
            postgres: PostgresConfig::default(),
            ..StorageConfig::default()
        };
        assert!(build_storage(&config).is_err());
    }
}
