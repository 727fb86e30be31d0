use crate::config::PostgresConfig;
use crate::storage::schema::{POSTGRES_DDL, RECORD_COLUMNS, TABLE_NAME};
use crate::storage::{CycleStore, NewServiceCycle, RecordId, ServiceCycleRecord, StorageError};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use deadpool_postgres::{Client, Manager, ManagerConfig, Pool, RecyclingMethod};
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use tracing::{error, info, warn};

const DEFAULT_POOL_SIZE: usize = 16;

/// Postgres backend on a bounded deadpool. A pooled client is checked out per
/// operation and goes back to the pool when it drops.
pub struct PostgresStorage {
    pool: Pool,
}

impl PostgresStorage {
    pub fn new(config: &PostgresConfig) -> Result<Self> {
        let mut pg_config = connection_config(config)?;
        pg_config.connect_timeout(Duration::from_secs(config.connect_timeout_s.max(1)));
        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = Manager::from_config(pg_config, NoTls, manager_config);
        let pool_size = if config.pool_size == 0 {
            DEFAULT_POOL_SIZE
        } else {
            config.pool_size
        };
        let pool = Pool::builder(manager)
            .max_size(pool_size)
            .build()
            .context("build postgres pool")?;
        Ok(Self { pool })
    }

    async fn client(&self) -> Result<Client, StorageError> {
        self.pool.get().await.map_err(|err| {
            warn!("cannot acquire postgres connection: {err}");
            StorageError::Unavailable(err.to_string())
        })
    }
}

/// Uses `dsn` verbatim when set, otherwise assembles the parameters field by field.
fn connection_config(config: &PostgresConfig) -> Result<tokio_postgres::Config> {
    let dsn = config.dsn.trim();
    if !dsn.is_empty() {
        return dsn
            .parse::<tokio_postgres::Config>()
            .context("invalid postgres dsn");
    }
    let host = config.host.trim();
    if host.is_empty() {
        return Err(anyhow!("postgres dsn and host are both empty"));
    }
    let mut pg_config = tokio_postgres::Config::new();
    pg_config.host(host);
    if let Some(port) = config.port {
        pg_config.port(port);
    }
    if !config.user.trim().is_empty() {
        pg_config.user(config.user.trim());
    }
    if !config.password.is_empty() {
        pg_config.password(config.password.as_str());
    }
    if !config.database.trim().is_empty() {
        pg_config.dbname(config.database.trim());
    }
    Ok(pg_config)
}

fn record_from_row(row: &Row) -> Result<ServiceCycleRecord, tokio_postgres::Error> {
    Ok(ServiceCycleRecord {
        id: row.try_get(0)?,
        timestamp: row.try_get::<_, NaiveDateTime>(1)?,
        ciclo_id: row.try_get(2)?,
        duracion_servicio_s: row.try_get(3)?,
        duracion_espera_s: row.try_get(4)?,
        finalizacion_tipo: row.try_get(5)?,
    })
}

#[async_trait]
impl CycleStore for PostgresStorage {
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        let client = self.client().await?;
        match client.batch_execute(POSTGRES_DDL).await {
            Ok(()) => {
                info!("table {TABLE_NAME} ready");
                Ok(())
            }
            // Concurrent starters can race past IF NOT EXISTS.
            Err(err) if err.code() == Some(&SqlState::DUPLICATE_TABLE) => Ok(()),
            Err(err) => {
                error!("failed to create table {TABLE_NAME}: {err}");
                Err(StorageError::Schema(err.to_string()))
            }
        }
    }

    async fn insert_record(&self, record: &NewServiceCycle) -> Result<RecordId, StorageError> {
        let client = self.client().await?;
        let row = client
            .query_one(
                r#"INSERT INTO registros_servicio
                   ("timestamp", ciclo_id, duracion_servicio_s, duracion_espera_s, finalizacion_tipo)
                   VALUES (now() AT TIME ZONE 'UTC', $1, $2, $3, $4)
                   RETURNING id"#,
                &[
                    &record.ciclo_id,
                    &record.duracion_servicio_s,
                    &record.duracion_espera_s,
                    &record.finalizacion_tipo,
                ],
            )
            .await
            .map_err(|err| {
                error!("failed to insert cycle record: {err}");
                StorageError::WriteFailed(err.to_string())
            })?;
        row.try_get::<_, i64>(0)
            .map_err(|err| StorageError::WriteFailed(err.to_string()))
    }

    async fn fetch_recent(&self, limit: i64) -> Result<Vec<ServiceCycleRecord>, StorageError> {
        let client = self.client().await?;
        let read_failed = |err: tokio_postgres::Error| {
            error!("failed to read cycle records: {err}");
            StorageError::ReadFailed(err.to_string())
        };
        let sql = format!(
            r#"SELECT {RECORD_COLUMNS} FROM {TABLE_NAME}
               ORDER BY "timestamp" DESC, id DESC LIMIT $1"#
        );
        let rows = client
            .query(sql.as_str(), &[&limit.max(0)])
            .await
            .map_err(read_failed)?;
        rows.iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_failed)
    }
}
