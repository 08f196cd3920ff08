//! Mock record stores
//!
//! Stores that misbehave on purpose, for exercising the persistence error
//! paths of the history service.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use fleet_history::db::{MemoryRecordStore, RecordStore, StoreError};

/// Store whose writes always fail with a database error
#[derive(Default)]
pub struct FailingRecordStore {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl RecordStore for FailingRecordStore {
    async fn load(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn persist(&self, _key: &str, _document: &str) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Database(sqlx::Error::PoolClosed))
    }

    async fn check_health(&self) -> Result<(), StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolClosed))
    }
}

/// Memory store that can be switched into failing mode
#[derive(Default)]
pub struct SwitchableRecordStore {
    inner: MemoryRecordStore,
    failing: AtomicBool,
}

impl SwitchableRecordStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for SwitchableRecordStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.load(key).await
    }

    async fn persist(&self, key: &str, document: &str) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        self.inner.persist(key, document).await
    }
}
