//! Fleet History Library
//!
//! Activity history for the fleet management application: an append-only,
//! bounded log of user actions with filtering, statistics, export and
//! change notifications, served over an HTTP API.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use services::HistoryService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// History service
    pub history: Arc<HistoryService>,
    /// Database connection pool (absent with the memory backend)
    pub db: Option<DbPool>,
}

/// Build the record store selected by `config.history.backend`
pub async fn open_store(
    config: &AppConfig,
) -> anyhow::Result<(db::HistoryStore, Option<DbPool>)> {
    use anyhow::Context;
    use crate::config::StorageBackend;
    use crate::db::{HistoryStore, MemoryRecordStore, RecordStore, SqliteRecordStore};

    let history_config = &config.history;
    let (backend, pool): (Arc<dyn RecordStore>, Option<DbPool>) = match history_config.backend {
        StorageBackend::Sqlite => {
            let pool = db::init_pool(&config.database)
                .await
                .context("Failed to initialize database")?;
            let store =
                SqliteRecordStore::new(pool.clone()).with_quota(history_config.quota_bytes);
            (Arc::new(store), Some(pool))
        }
        StorageBackend::Memory => (
            Arc::new(MemoryRecordStore::new().with_quota(history_config.quota_bytes)),
            None,
        ),
    };

    let store = HistoryStore::new(backend, history_config.storage_key.clone());
    Ok((store, pool))
}

/// Open the configured store and load the history service over it
pub async fn open_history(config: &AppConfig) -> anyhow::Result<(HistoryService, Option<DbPool>)> {
    let (store, pool) = open_store(config).await?;
    let history = HistoryService::open(store, config.history.clone()).await;
    Ok((history, pool))
}
