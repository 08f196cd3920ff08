//! In-memory history log engine
//!
//! [`HistoryLog`] owns the ordered entries (newest first) and implements
//! append with capacity eviction, retention cleanup, filtering, sorting,
//! pagination and the aggregate views. It performs no I/O; the async
//! [`HistoryService`](super::HistoryService) wraps it with locking,
//! persistence and notifications.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use super::sanitizer;
use crate::config::HistoryConfig;
use crate::models::{
    DistinctValues, EntryMetadata, FilterCriteria, HistoryPage, HistoryQuery, HistoryStatistics,
    LogEntry, Module, NewEntry, SortField, SortOrder,
};
use crate::utils::HistoryError;

/// Length of the random part of generated ids
const ID_SUFFIX_LEN: usize = 9;

/// Days covered by [`HistoryLog::statistics`]
pub const STATISTICS_WINDOW_DAYS: i64 = 30;

/// Share of entries kept when the store rejects a document as too large
const QUOTA_KEEP_RATIO: f64 = 0.7;

/// Bounds applied by the engine
#[derive(Debug, Clone)]
pub struct HistoryLimits {
    pub max_entries: usize,
    pub retention: Duration,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub default_user: String,
}

impl From<&HistoryConfig> for HistoryLimits {
    fn from(config: &HistoryConfig) -> Self {
        Self {
            max_entries: config.max_entries.max(1),
            retention: config.retention(),
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            default_user: config.default_user.clone(),
        }
    }
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self::from(&HistoryConfig::default())
    }
}

/// Ordered, bounded collection of history entries
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<LogEntry>,
    ids: HashSet<String>,
    limits: HistoryLimits,
}

impl HistoryLog {
    pub fn new(limits: HistoryLimits) -> Self {
        Self {
            entries: VecDeque::new(),
            ids: HashSet::new(),
            limits,
        }
    }

    /// Build a log from stored entries (newest first), keeping the first
    /// occurrence of each id and at most `max_entries` of them.
    pub fn from_entries(entries: Vec<LogEntry>, limits: HistoryLimits) -> Self {
        let mut log = Self::new(limits);
        for entry in entries {
            if log.entries.len() >= log.limits.max_entries {
                break;
            }
            if log.ids.insert(entry.id.clone()) {
                log.entries.push_back(entry);
            }
        }
        log
    }

    pub fn limits(&self) -> &HistoryLimits {
        &self.limits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, newest first
    pub fn entries(&self) -> &VecDeque<LogEntry> {
        &self.entries
    }

    /// Build a complete entry from a request.
    ///
    /// `environment` is used when the request carries no metadata of its own.
    pub fn create_entry(
        &self,
        request: NewEntry,
        now: DateTime<Utc>,
        environment: EntryMetadata,
    ) -> Result<LogEntry, HistoryError> {
        let entite = request.entite.trim().to_string();
        if entite.is_empty() {
            return Err(HistoryError::MissingField("entite"));
        }

        let module = request
            .module
            .unwrap_or_else(|| Module::for_entity(&entite));

        let id_reference = request
            .id_reference
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| generate_token("ref", now));

        let utilisateur = request
            .utilisateur
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.limits.default_user.clone());

        let metadata = request
            .metadata
            .filter(|m| !m.is_empty())
            .unwrap_or(environment);

        Ok(LogEntry {
            id: self.unique_id(now),
            id_reference,
            action: request.action,
            module,
            entite,
            timestamp: now,
            utilisateur,
            commentaire: request.commentaire.unwrap_or_default(),
            donnees: sanitizer::sanitize(request.donnees.as_ref()),
            metadata,
        })
    }

    fn unique_id(&self, now: DateTime<Utc>) -> String {
        loop {
            let id = generate_token("hist", now);
            if !self.ids.contains(&id) {
                return id;
            }
        }
    }

    /// Prepend an entry and drop the oldest beyond capacity.
    ///
    /// Returns the number of evicted entries.
    pub fn push(&mut self, entry: LogEntry) -> usize {
        self.ids.insert(entry.id.clone());
        self.entries.push_front(entry);
        self.truncate(self.limits.max_entries)
    }

    /// Keep only the `len` newest entries; returns how many were removed
    pub fn truncate(&mut self, len: usize) -> usize {
        let mut removed = 0;
        while self.entries.len() > len {
            if let Some(old) = self.entries.pop_back() {
                self.ids.remove(&old.id);
                removed += 1;
            }
        }
        removed
    }

    /// Drop the oldest ~30% of entries after a quota rejection.
    ///
    /// The newest entry is always kept.
    pub fn shrink_for_quota(&mut self) -> usize {
        let keep = (self.entries.len() as f64 * QUOTA_KEEP_RATIO).floor() as usize;
        self.truncate(keep.max(1))
    }

    /// Remove entries older than the retention window
    pub fn remove_expired(&mut self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.limits.retention) else {
            return 0;
        };
        let before = self.entries.len();
        let ids = &mut self.ids;
        self.entries.retain(|entry| {
            let keep = entry.timestamp >= cutoff;
            if !keep {
                ids.remove(&entry.id);
            }
            keep
        });
        before - self.entries.len()
    }

    /// Remove every entry; returns how many there were
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.ids.clear();
        count
    }

    /// Matching entries, newest first
    pub fn filter(&self, criteria: &FilterCriteria) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|entry| criteria.matches(entry))
            .cloned()
            .collect()
    }

    /// Matching entries in the requested order, unpaginated
    pub fn sorted(&self, query: &HistoryQuery) -> Vec<LogEntry> {
        let mut entries = self.filter(&query.criteria);
        sort_entries(&mut entries, query.sort_field(), query.sort_order());
        entries
    }

    /// Filter, sort and slice one page
    pub fn query(&self, query: &HistoryQuery) -> HistoryPage {
        let (page, limit) =
            query.pagination(self.limits.default_page_size, self.limits.max_page_size);
        let sorted = self.sorted(query);

        let total = sorted.len();
        let pages = total.div_ceil(limit);
        let page = page.min(pages.max(1));

        let entries = sorted
            .into_iter()
            .skip((page - 1) * limit)
            .take(limit)
            .collect();

        HistoryPage {
            entries,
            total,
            pages,
            page,
            limit,
        }
    }

    pub fn get(&self, id: &str) -> Option<&LogEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Entries sharing a reference, oldest first
    pub fn by_reference(&self, id_reference: &str) -> Vec<LogEntry> {
        let mut related: Vec<LogEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.id_reference == id_reference)
            .cloned()
            .collect();
        related.sort_by_key(|entry| entry.timestamp);
        related
    }

    /// Counts over the last [`STATISTICS_WINDOW_DAYS`] days
    pub fn statistics(&self, now: DateTime<Utc>) -> HistoryStatistics {
        let since = now - Duration::days(STATISTICS_WINDOW_DAYS);

        let mut actions_par_jour: BTreeMap<String, usize> = (0..STATISTICS_WINDOW_DAYS)
            .map(|i| (day_key(now - Duration::days(i)), 0))
            .collect();

        let mut stats = HistoryStatistics {
            total: self.entries.len(),
            ..Default::default()
        };

        for entry in self.entries.iter().filter(|e| e.timestamp >= since) {
            stats.total_window += 1;
            *stats
                .actions_par_type
                .entry(entry.action.to_string())
                .or_default() += 1;
            *stats
                .actions_par_module
                .entry(entry.module.to_string())
                .or_default() += 1;
            *stats
                .actions_par_utilisateur
                .entry(entry.utilisateur.clone())
                .or_default() += 1;
            if let Some(count) = actions_par_jour.get_mut(&day_key(entry.timestamp)) {
                *count += 1;
            }
        }

        stats.actions_par_jour = actions_par_jour;
        stats
    }

    /// Sorted distinct values of the filterable fields
    pub fn distinct_values(&self) -> DistinctValues {
        let mut types = BTreeSet::new();
        let mut entites = BTreeSet::new();
        let mut modules = BTreeSet::new();
        let mut utilisateurs = BTreeSet::new();

        for entry in &self.entries {
            types.insert(entry.action.as_str());
            entites.insert(entry.entite.as_str());
            modules.insert(entry.module.as_str());
            if !entry.utilisateur.is_empty() {
                utilisateurs.insert(entry.utilisateur.as_str());
            }
        }

        let owned = |set: BTreeSet<&str>| set.into_iter().map(str::to_string).collect();
        DistinctValues {
            types: owned(types),
            entites: owned(entites),
            modules: owned(modules),
            utilisateurs: owned(utilisateurs),
        }
    }
}

/// Stable sort; equal keys keep their current relative order in both directions
pub fn sort_entries(entries: &mut [LogEntry], field: SortField, order: SortOrder) {
    entries.sort_by(|a, b| {
        let ordering = compare_by(a, b, field);
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

fn compare_by(a: &LogEntry, b: &LogEntry, field: SortField) -> Ordering {
    match field {
        SortField::Timestamp => a.timestamp.cmp(&b.timestamp),
        SortField::Action => a.action.as_str().cmp(b.action.as_str()),
        SortField::Module => a.module.as_str().cmp(b.module.as_str()),
        SortField::Entite => a.entite.cmp(&b.entite),
        SortField::Utilisateur => a.utilisateur.cmp(&b.utilisateur),
        SortField::Id => a.id.cmp(&b.id),
        SortField::IdReference => a.id_reference.cmp(&b.id_reference),
        SortField::Commentaire => a.commentaire.cmp(&b.commentaire),
    }
}

fn day_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// `<prefix>_<epoch millis>_<random base36>`
pub fn generate_token(prefix: &str, now: DateTime<Utc>) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}_{}_{}", prefix, now.timestamp_millis(), suffix)
}
