//! History service
//!
//! Shared, async front of the history log. Every mutation holds the write
//! lock for the whole modify-then-persist sequence; observers are notified
//! after the lock is released.

use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use super::environment::{EnvironmentInfo, NoEnvironment};
use super::events::{EventKind, EventNotifier, HistoryEvent, SubscriptionId};
use super::export::{self, CsvOptions, ExportFormat};
use super::history_log::{HistoryLimits, HistoryLog};
use crate::config::HistoryConfig;
use crate::db::HistoryStore;
use crate::models::{
    DistinctValues, FilterCriteria, HistoryPage, HistoryQuery, HistoryStatistics, LogEntry,
    NewEntry,
};
use crate::utils::{Clock, HistoryError, SystemClock};

/// Page size used by [`HistoryService::page`] when none is given
pub const PAGE_HELPER_SIZE: usize = 20;

/// Outcome of a successful append
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub entry: LogEntry,
    /// Whether the updated log reached the store
    pub persisted: bool,
}

pub struct HistoryService {
    log: RwLock<HistoryLog>,
    store: HistoryStore,
    events: EventNotifier,
    clock: Arc<dyn Clock>,
    environment: Arc<dyn EnvironmentInfo>,
    config: HistoryConfig,
}

impl HistoryService {
    /// Load the stored log and run an initial retention pass
    pub async fn open(store: HistoryStore, config: HistoryConfig) -> Self {
        Self::open_with(store, config, Arc::new(SystemClock), Arc::new(NoEnvironment)).await
    }

    pub async fn open_with(
        store: HistoryStore,
        config: HistoryConfig,
        clock: Arc<dyn Clock>,
        environment: Arc<dyn EnvironmentInfo>,
    ) -> Self {
        let stored = store.load().await;
        let stored_count = stored.len();
        let log = HistoryLog::from_entries(stored, HistoryLimits::from(&config));

        if log.len() < stored_count {
            warn!(
                stored = stored_count,
                kept = log.len(),
                max_entries = config.max_entries,
                "Stored history exceeds capacity, keeping the newest entries"
            );
        }
        info!(entries = log.len(), key = %store.key(), "History loaded");

        let service = Self {
            log: RwLock::new(log),
            store,
            events: EventNotifier::new(config.event_channel_capacity),
            clock,
            environment,
            config,
        };
        service.cleanup().await;
        service
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Current time according to the service clock
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Append an entry; returns its id, or `None` if the request was invalid
    pub async fn record(&self, request: NewEntry) -> Option<String> {
        match self.try_record(request).await {
            Ok(recorded) => Some(recorded.entry.id),
            Err(e) => {
                warn!("History entry rejected: {}", e);
                None
            }
        }
    }

    /// Append an entry, reporting validation failures and persistence status
    pub async fn try_record(&self, request: NewEntry) -> Result<Recorded, HistoryError> {
        let now = self.clock.now();
        let environment = match request.metadata {
            Some(ref m) if !m.is_empty() => Default::default(),
            _ => self.environment.collect(),
        };

        let (entry, persisted) = {
            let mut log = self.log.write().await;
            let entry = log.create_entry(request, now, environment)?;
            let evicted = log.push(entry.clone());
            if evicted > 0 {
                debug!(evicted, "Evicted oldest history entries over capacity");
            }
            let persisted = self.persist_locked(&mut log).await;
            (entry, persisted)
        };

        debug!(
            id = %entry.id,
            action = %entry.action,
            entite = %entry.entite,
            "History entry recorded"
        );
        self.events
            .notify(&HistoryEvent::NouvelleEntree(entry.clone()));

        Ok(Recorded { entry, persisted })
    }

    /// Write the whole log; on a quota rejection drop the oldest ~30% and retry once
    async fn persist_locked(&self, log: &mut HistoryLog) -> bool {
        match self.store.persist(log.entries()).await {
            Ok(()) => true,
            Err(e) if e.is_quota_exceeded() => {
                let dropped = log.shrink_for_quota();
                warn!(
                    dropped,
                    remaining = log.len(),
                    "History over storage quota, dropped oldest entries"
                );
                match self.store.persist(log.entries()).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Failed to persist history after reduction: {}", e);
                        false
                    }
                }
            }
            Err(e) => {
                error!("Failed to persist history: {}", e);
                false
            }
        }
    }

    /// Remove entries older than the retention window; returns the count
    pub async fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let removed = {
            let mut log = self.log.write().await;
            let removed = log.remove_expired(now);
            if removed > 0 {
                self.persist_locked(&mut log).await;
            }
            removed
        };

        if removed > 0 {
            info!(
                removed,
                retention_days = self.config.retention_days,
                "Removed expired history entries"
            );
            self.events.notify(&HistoryEvent::Nettoyage { removed });
        }
        removed
    }

    /// Empty the log; returns whether the empty log was persisted
    pub async fn clear(&self) -> bool {
        let (removed, persisted) = {
            let mut log = self.log.write().await;
            let removed = log.clear();
            (removed, self.persist_locked(&mut log).await)
        };

        info!(removed, "History cleared");
        self.events.notify(&HistoryEvent::HistoriqueVide);
        persisted
    }

    pub async fn len(&self) -> usize {
        self.log.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.log.read().await.is_empty()
    }

    /// Matching entries, newest first
    pub async fn filter(&self, criteria: &FilterCriteria) -> Vec<LogEntry> {
        self.log.read().await.filter(criteria)
    }

    pub async fn query(&self, query: &HistoryQuery) -> HistoryPage {
        self.log.read().await.query(query)
    }

    /// One page of matching entries, newest first
    pub async fn page(
        &self,
        page: usize,
        size: Option<usize>,
        criteria: &FilterCriteria,
    ) -> HistoryPage {
        let query = HistoryQuery::new(criteria.clone())
            .paginate(page, size.unwrap_or(PAGE_HELPER_SIZE));
        self.query(&query).await
    }

    pub async fn get(&self, id: &str) -> Option<LogEntry> {
        self.log.read().await.get(id).cloned()
    }

    /// Entries sharing `id_reference`, oldest first
    pub async fn by_reference(&self, id_reference: &str) -> Vec<LogEntry> {
        self.log.read().await.by_reference(id_reference)
    }

    pub async fn statistics(&self) -> HistoryStatistics {
        let now = self.clock.now();
        self.log.read().await.statistics(now)
    }

    pub async fn distinct_values(&self) -> DistinctValues {
        self.log.read().await.distinct_values()
    }

    /// Export every entry matching the query, in the query's sort order
    pub async fn export(
        &self,
        format: ExportFormat,
        query: &HistoryQuery,
    ) -> Result<String, serde_json::Error> {
        let entries = self.log.read().await.sorted(query);
        export::render(
            format,
            &entries,
            &query.criteria,
            self.config.separator(),
            self.clock.now(),
        )
    }

    pub async fn export_csv(&self, query: &HistoryQuery) -> String {
        let entries = self.log.read().await.sorted(query);
        export::to_csv(
            &entries,
            CsvOptions {
                separator: self.config.separator(),
                include_header: true,
            },
        )
    }

    pub async fn export_json(&self, query: &HistoryQuery) -> Result<String, serde_json::Error> {
        let entries = self.log.read().await.sorted(query);
        export::to_json(&entries, &query.criteria, self.clock.now())
    }

    /// Register a synchronous observer
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&HistoryEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, handler)
    }

    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.events.off(kind, id)
    }

    /// Async stream of every future event
    pub fn events(&self) -> broadcast::Receiver<HistoryEvent> {
        self.events.subscribe()
    }
}

/// Load the stored log without writing back to the store.
///
/// Entries past the retention window as of `now` are left out of the
/// returned copy only.
pub async fn load_snapshot(
    store: &HistoryStore,
    config: &HistoryConfig,
    now: chrono::DateTime<chrono::Utc>,
) -> HistoryLog {
    let mut log = HistoryLog::from_entries(store.load().await, HistoryLimits::from(config));
    let expired = log.remove_expired(now);
    debug!(entries = log.len(), expired, key = %store.key(), "History snapshot loaded");
    log
}
