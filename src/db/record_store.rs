//! Key/value document stores
//!
//! A [`RecordStore`] keeps whole serialized documents under string keys.
//! Writes replace the previous document atomically. An optional byte quota
//! rejects oversized documents the way browser storage does.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;

use super::DbPool;

/// Failures reported by a record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage quota exceeded: {size} bytes over a {quota} byte limit")]
    QuotaExceeded { size: usize, quota: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }
}

fn check_quota(quota: Option<usize>, document: &str) -> Result<(), StoreError> {
    match quota {
        Some(quota) if document.len() > quota => Err(StoreError::QuotaExceeded {
            size: document.len(),
            quota,
        }),
        _ => Ok(()),
    }
}

/// Durable storage of whole documents under string keys
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the document stored under `key`, if any
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the document stored under `key`
    async fn persist(&self, key: &str, document: &str) -> Result<(), StoreError>;

    /// Check that the backend is reachable
    async fn check_health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// SQLite-backed store using the `record_store` table
pub struct SqliteRecordStore {
    pool: DbPool,
    quota_bytes: Option<usize>,
}

impl SqliteRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            quota_bytes: None,
        }
    }

    pub fn with_quota(mut self, quota_bytes: Option<usize>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = sqlx::query_scalar::<_, String>(
            r#"
            SELECT value
            FROM record_store
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn persist(&self, key: &str, document: &str) -> Result<(), StoreError> {
        check_quota(self.quota_bytes, document)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO record_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(document)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn check_health(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

/// Process-local store
#[derive(Default)]
pub struct MemoryRecordStore {
    documents: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(mut self, quota_bytes: Option<usize>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Seed a raw document, bypassing the quota
    pub async fn insert_raw(&self, key: &str, document: impl Into<String>) {
        self.documents
            .write()
            .await
            .insert(key.to_string(), document.into());
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn persist(&self, key: &str, document: &str) -> Result<(), StoreError> {
        check_quota(self.quota_bytes, document)?;
        self.documents
            .write()
            .await
            .insert(key.to_string(), document.to_string());
        Ok(())
    }
}
