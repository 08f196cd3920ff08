//! Aggregates computed over the history

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Activity summary over a trailing window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStatistics {
    /// Entries currently held
    pub total: usize,
    /// Entries inside the window
    #[serde(rename = "total30Jours")]
    pub total_window: usize,
    pub actions_par_type: BTreeMap<String, usize>,
    pub actions_par_module: BTreeMap<String, usize>,
    pub actions_par_utilisateur: BTreeMap<String, usize>,
    /// One key per day of the window (`YYYY-MM-DD`), zero-filled
    pub actions_par_jour: BTreeMap<String, usize>,
}

/// Sorted distinct values present in the log, used to populate filter choices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinctValues {
    pub types: Vec<String>,
    pub entites: Vec<String>,
    pub modules: Vec<String>,
    pub utilisateurs: Vec<String>,
}
