//! Filter, sort and pagination parameters for history queries

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

use super::{ActionType, LogEntry, Module};

/// AND-combined filter criteria; `None` matches everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub module: Option<Module>,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub action: Option<ActionType>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub entite: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub utilisateur: Option<String>,
    /// Inclusive lower bound
    #[serde(
        default,
        deserialize_with = "date_param",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_debut: Option<DateTime<Utc>>,
    /// Inclusive upper bound, extended to the end of its UTC day
    #[serde(
        default,
        deserialize_with = "date_param",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_fin: Option<DateTime<Utc>>,
    /// Case-insensitive free-text search
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub recherche: Option<String>,
}

impl FilterCriteria {
    pub fn module(mut self, module: Module) -> Self {
        self.module = Some(module);
        self
    }

    pub fn action(mut self, action: ActionType) -> Self {
        self.action = Some(action);
        self
    }

    pub fn entite(mut self, entite: impl Into<String>) -> Self {
        self.entite = Some(entite.into());
        self
    }

    pub fn utilisateur(mut self, utilisateur: impl Into<String>) -> Self {
        self.utilisateur = Some(utilisateur.into());
        self
    }

    pub fn since(mut self, date_debut: DateTime<Utc>) -> Self {
        self.date_debut = Some(date_debut);
        self
    }

    pub fn until(mut self, date_fin: DateTime<Utc>) -> Self {
        self.date_fin = Some(date_fin);
        self
    }

    pub fn recherche(mut self, recherche: impl Into<String>) -> Self {
        self.recherche = Some(recherche.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == FilterCriteria::default()
    }

    /// Whether an entry satisfies every present criterion
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if self.module.is_some_and(|m| m != entry.module) {
            return false;
        }
        if self.action.is_some_and(|a| a != entry.action) {
            return false;
        }
        if self.entite.as_deref().is_some_and(|e| e != entry.entite) {
            return false;
        }
        if self
            .utilisateur
            .as_deref()
            .is_some_and(|u| u != entry.utilisateur)
        {
            return false;
        }
        if self.date_debut.is_some_and(|d| entry.timestamp < d) {
            return false;
        }
        if self
            .date_fin
            .is_some_and(|d| entry.timestamp > end_of_day(d))
        {
            return false;
        }
        if let Some(needle) = self.recherche.as_deref() {
            if !entry.search_text().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Field used to order query results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Timestamp,
    #[serde(rename = "type")]
    Action,
    Module,
    Entite,
    Utilisateur,
    Id,
    IdReference,
    Commentaire,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "timestamp" => Ok(SortField::Timestamp),
            "type" => Ok(SortField::Action),
            "module" => Ok(SortField::Module),
            "entite" => Ok(SortField::Entite),
            "utilisateur" => Ok(SortField::Utilisateur),
            "id" => Ok(SortField::Id),
            "idreference" => Ok(SortField::IdReference),
            "commentaire" => Ok(SortField::Commentaire),
            _ => Err(format!("Invalid sort field: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(format!("Invalid sort order: {}", s)),
        }
    }
}

/// Query parameters for the paginated history listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(flatten)]
    pub criteria: FilterCriteria,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub tri_par: Option<SortField>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub ordre_tri: Option<SortOrder>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub page: Option<usize>,
    #[serde(default, alias = "taillePage", deserialize_with = "empty_as_none")]
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn new(criteria: FilterCriteria) -> Self {
        Self {
            criteria,
            ..Default::default()
        }
    }

    pub fn sort(mut self, field: SortField, order: SortOrder) -> Self {
        self.tri_par = Some(field);
        self.ordre_tri = Some(order);
        self
    }

    pub fn paginate(mut self, page: usize, limit: usize) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }

    pub fn sort_field(&self) -> SortField {
        self.tri_par.unwrap_or_default()
    }

    pub fn sort_order(&self) -> SortOrder {
        self.ordre_tri.unwrap_or_default()
    }

    /// Requested page (at least 1) and page size clamped to `[1, max_limit]`
    pub fn pagination(&self, default_limit: usize, max_limit: usize) -> (usize, usize) {
        let max_limit = max_limit.max(1);
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(default_limit).clamp(1, max_limit);
        (page, limit)
    }
}

/// One page of query results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryPage {
    pub entries: Vec<LogEntry>,
    pub total: usize,
    pub pages: usize,
    pub page: usize,
    pub limit: usize,
}

/// Last representable millisecond of the UTC day containing `at`
pub fn end_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    at.date_naive().and_time(last).and_utc()
}

/// Parse a date parameter: RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.fff]`
/// read as UTC, or a bare `YYYY-MM-DD` meaning the start of that day.
pub fn parse_date_param(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(format!("Invalid date: {}", value))
}

/// Treat missing and blank parameters alike, parse the rest with `FromStr`
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<T>().map(Some).map_err(de::Error::custom),
    }
}

fn date_param<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date_param(s).map(Some).map_err(de::Error::custom),
    }
}
