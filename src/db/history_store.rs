//! History document codec
//!
//! The log is persisted as `{"version": 1, "entries": [...]}` under a single
//! key. Loading also accepts the older bare-array layout and never fails:
//! unreadable documents yield an empty log and unreadable entries are dropped.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::{RecordStore, StoreError};
use crate::models::LogEntry;

/// Layout version written by [`HistoryStore::persist`]
pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Serialize)]
struct DocumentRef<'a, E: ?Sized> {
    version: u32,
    entries: &'a E,
}

/// Reads and writes the history document through a [`RecordStore`]
#[derive(Clone)]
pub struct HistoryStore {
    store: Arc<dyn RecordStore>,
    key: String,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn RecordStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn backend(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Load the stored entries in stored order
    pub async fn load(&self) -> Vec<LogEntry> {
        match self.store.load(&self.key).await {
            Ok(Some(document)) => decode(&document),
            Ok(None) => Vec::new(),
            Err(e) => {
                error!(key = %self.key, "Failed to read history document: {}", e);
                Vec::new()
            }
        }
    }

    /// Replace the stored document with `entries`
    pub async fn persist<E>(&self, entries: &E) -> Result<(), StoreError>
    where
        E: Serialize + Sync + ?Sized,
    {
        let document = encode(entries)?;
        self.store.persist(&self.key, &document).await
    }
}

/// Serialize entries into the versioned envelope
pub fn encode<E>(entries: &E) -> Result<String, StoreError>
where
    E: Serialize + ?Sized,
{
    let document = DocumentRef {
        version: DOCUMENT_VERSION,
        entries,
    };
    Ok(serde_json::to_string(&document)?)
}

/// Parse a stored document, keeping every well-formed entry once
pub fn decode(document: &str) -> Vec<LogEntry> {
    let parsed: Value = match serde_json::from_str(document) {
        Ok(value) => value,
        Err(e) => {
            warn!("Discarding unreadable history document: {}", e);
            return Vec::new();
        }
    };

    let raw_entries = match parsed {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            if let Some(version) = map.get("version").and_then(Value::as_u64) {
                if version > u64::from(DOCUMENT_VERSION) {
                    warn!(version, "History document written by a newer version");
                }
            }
            match map.remove("entries") {
                Some(Value::Array(items)) => items,
                _ => {
                    warn!("Discarding history document without an entries array");
                    return Vec::new();
                }
            }
        }
        _ => {
            warn!("Discarding history document with unexpected shape");
            return Vec::new();
        }
    };

    let total = raw_entries.len();
    let mut seen = HashSet::with_capacity(total);
    let mut entries = Vec::with_capacity(total);

    for raw in raw_entries {
        if !has_required_fields(&raw) {
            debug!("Dropping history entry without id, type or timestamp");
            continue;
        }
        match serde_json::from_value::<LogEntry>(raw) {
            Ok(entry) => {
                if seen.insert(entry.id.clone()) {
                    entries.push(entry);
                } else {
                    debug!(id = %entry.id, "Dropping duplicate history entry");
                }
            }
            Err(e) => debug!("Dropping unreadable history entry: {}", e),
        }
    }

    if entries.len() < total {
        warn!(
            kept = entries.len(),
            dropped = total - entries.len(),
            "Dropped invalid history entries while loading"
        );
    }

    entries
}

fn has_required_fields(raw: &Value) -> bool {
    let non_empty = |field: &str| {
        raw.get(field)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
    };
    non_empty("id") && non_empty("type") && non_empty("timestamp")
}
