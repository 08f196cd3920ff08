//! Record requests
//!
//! Callers describe an action either with the structured builder or with the
//! legacy positional form `(type, entite, donnees, utilisateur, commentaire,
//! idReference)`. Both normalize into a [`NewEntry`], which the history
//! engine turns into a [`LogEntry`](super::LogEntry) in one place.

use serde::{Deserialize, Serialize};
use tracing::error;
use validator::Validate;

use super::{ActionType, EntryMetadata, Module};
use crate::services::sanitizer;
use crate::utils::HistoryError;

/// Normalized description of an action to record
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub action: ActionType,
    pub entite: String,
    pub module: Option<Module>,
    pub donnees: Option<serde_json::Value>,
    pub utilisateur: Option<String>,
    pub commentaire: Option<String>,
    pub id_reference: Option<String>,
    pub metadata: Option<EntryMetadata>,
}

impl NewEntry {
    pub fn new(action: ActionType, entite: impl Into<String>) -> Self {
        Self {
            action,
            entite: entite.into(),
            module: None,
            donnees: None,
            utilisateur: None,
            commentaire: None,
            id_reference: None,
            metadata: None,
        }
    }

    /// Build an entry from the legacy positional call convention.
    ///
    /// The module is always derived from the entity in this form.
    pub fn legacy(
        action: &str,
        entite: &str,
        donnees: Option<serde_json::Value>,
        utilisateur: Option<&str>,
        commentaire: Option<&str>,
        id_reference: Option<&str>,
    ) -> Result<Self, HistoryError> {
        let action = parse_action(action)?;
        let mut entry = NewEntry::new(action, entite);
        entry.donnees = donnees;
        entry.utilisateur = utilisateur.map(str::to_string);
        entry.commentaire = commentaire.map(str::to_string);
        entry.id_reference = id_reference.map(str::to_string);
        Ok(entry)
    }

    pub fn module(mut self, module: Module) -> Self {
        self.module = Some(module);
        self
    }

    pub fn donnees(mut self, donnees: serde_json::Value) -> Self {
        self.donnees = Some(donnees);
        self
    }

    /// Attach a typed payload; a payload that cannot be represented as JSON
    /// is replaced by the "data unavailable" marker.
    pub fn donnees_from<T: Serialize>(mut self, payload: &T) -> Self {
        let value = serde_json::to_value(payload).unwrap_or_else(|e| {
            error!("Failed to convert history payload to JSON: {}", e);
            sanitizer::unavailable()
        });
        self.donnees = Some(value);
        self
    }

    pub fn utilisateur(mut self, utilisateur: impl Into<String>) -> Self {
        self.utilisateur = Some(utilisateur.into());
        self
    }

    pub fn commentaire(mut self, commentaire: impl Into<String>) -> Self {
        self.commentaire = Some(commentaire.into());
        self
    }

    pub fn id_reference(mut self, id_reference: impl Into<String>) -> Self {
        self.id_reference = Some(id_reference.into());
        self
    }

    pub fn metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

fn parse_action(action: &str) -> Result<ActionType, HistoryError> {
    if action.trim().is_empty() {
        return Err(HistoryError::MissingField("type"));
    }
    action
        .parse()
        .map_err(|_| HistoryError::InvalidActionType(action.to_string()))
}

/// Structured record body accepted by the HTTP API
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StructuredRecord {
    #[serde(rename = "type")]
    pub action: Option<String>,
    pub module: Option<String>,
    #[validate(length(max = 100))]
    pub entite: Option<String>,
    pub donnees: Option<serde_json::Value>,
    #[validate(length(max = 255))]
    pub utilisateur: Option<String>,
    #[validate(length(max = 2000))]
    pub commentaire: Option<String>,
    #[validate(length(max = 128))]
    pub id_reference: Option<String>,
}

/// Either call convention, as received over the wire
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecordRequest {
    /// `["creation", "recette", {...}, "alice", "comment", "ref_1"]`
    Positional(Vec<serde_json::Value>),
    Structured(StructuredRecord),
}

impl RecordRequest {
    pub fn into_new_entry(self) -> Result<NewEntry, HistoryError> {
        match self {
            RecordRequest::Structured(record) => record.try_into(),
            RecordRequest::Positional(args) => positional_into_entry(args),
        }
    }
}

impl TryFrom<StructuredRecord> for NewEntry {
    type Error = HistoryError;

    fn try_from(record: StructuredRecord) -> Result<Self, Self::Error> {
        let action = parse_action(record.action.as_deref().unwrap_or_default())?;
        let entite = record
            .entite
            .filter(|e| !e.trim().is_empty())
            .ok_or(HistoryError::MissingField("entite"))?;

        let module = match record.module.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(m) => Some(
                m.parse::<Module>()
                    .map_err(|_| HistoryError::InvalidModule(m.to_string()))?,
            ),
        };

        Ok(NewEntry {
            action,
            entite,
            module,
            donnees: record.donnees,
            utilisateur: record.utilisateur,
            commentaire: record.commentaire,
            id_reference: record.id_reference,
            metadata: None,
        })
    }
}

const POSITIONAL_NAMES: [&str; 6] = [
    "type",
    "entite",
    "donnees",
    "utilisateur",
    "commentaire",
    "idReference",
];

fn positional_into_entry(args: Vec<serde_json::Value>) -> Result<NewEntry, HistoryError> {
    if args.is_empty() || args.len() > POSITIONAL_NAMES.len() {
        return Err(HistoryError::InvalidArguments(format!(
            "expected 1 to {} positional arguments, got {}",
            POSITIONAL_NAMES.len(),
            args.len()
        )));
    }

    let mut args = args.into_iter();
    let action = positional_str(args.next(), 0)?.unwrap_or_default();
    let entite = positional_str(args.next(), 1)?.unwrap_or_default();
    let donnees = args.next().filter(|v| !v.is_null());
    let utilisateur = positional_str(args.next(), 3)?;
    let commentaire = positional_str(args.next(), 4)?;
    let id_reference = positional_str(args.next(), 5)?;

    NewEntry::legacy(
        &action,
        &entite,
        donnees,
        utilisateur.as_deref(),
        commentaire.as_deref(),
        id_reference.as_deref(),
    )
}

fn positional_str(
    value: Option<serde_json::Value>,
    position: usize,
) -> Result<Option<String>, HistoryError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(HistoryError::InvalidArguments(format!(
            "argument '{}' must be a string, got {}",
            POSITIONAL_NAMES[position], other
        ))),
    }
}
