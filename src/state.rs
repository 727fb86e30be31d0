// Shared application state: immutable configuration plus the storage handle.

use crate::config::Config;
use crate::storage::{build_storage, CycleStore, StorageError};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn CycleStore>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let storage = build_storage(&config.storage)?;
        Ok(Self::with_storage(config, storage))
    }

    pub fn with_storage(config: Config, storage: Arc<dyn CycleStore>) -> Self {
        Self {
            config: Arc::new(config),
            storage,
        }
    }

    /// Creates the table at startup. Failures are logged and the server keeps going in
    /// degraded mode unless `storage.fail_fast_on_schema_error` is set.
    pub async fn prepare_storage(&self) -> Result<()> {
        match self.storage.ensure_schema().await {
            Ok(()) => Ok(()),
            Err(err) if self.config.storage.fail_fast_on_schema_error => {
                error!("storage schema unavailable, aborting startup: {err}");
                Err(anyhow!(err))
            }
            Err(err) => {
                log_degraded(&err);
                Ok(())
            }
        }
    }
}

fn log_degraded(err: &StorageError) {
    match err {
        StorageError::Unavailable(_) => {
            warn!("database unreachable at startup, requests will fail until it recovers: {err}")
        }
        _ => error!("cannot ensure storage schema, continuing in degraded mode: {err}"),
    }
}
