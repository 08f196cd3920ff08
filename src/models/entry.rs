//! History entry model and its closed vocabularies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// User recorded when the caller does not name one
pub const DEFAULT_USER: &str = "system";

/// Kind of action recorded in the history
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    #[serde(alias = "create")]
    Creation,
    #[serde(alias = "update")]
    Modification,
    #[serde(alias = "delete")]
    Suppression,
    Connexion,
    Deconnexion,
    Validation,
    Annulation,
    Import,
    Export,
    Autre,
}

impl ActionType {
    pub const ALL: [ActionType; 10] = [
        ActionType::Creation,
        ActionType::Modification,
        ActionType::Suppression,
        ActionType::Connexion,
        ActionType::Deconnexion,
        ActionType::Validation,
        ActionType::Annulation,
        ActionType::Import,
        ActionType::Export,
        ActionType::Autre,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Creation => "creation",
            ActionType::Modification => "modification",
            ActionType::Suppression => "suppression",
            ActionType::Connexion => "connexion",
            ActionType::Deconnexion => "deconnexion",
            ActionType::Validation => "validation",
            ActionType::Annulation => "annulation",
            ActionType::Import => "import",
            ActionType::Export => "export",
            ActionType::Autre => "autre",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "creation" | "create" => Ok(ActionType::Creation),
            "modification" | "update" => Ok(ActionType::Modification),
            "suppression" | "delete" => Ok(ActionType::Suppression),
            "connexion" => Ok(ActionType::Connexion),
            "deconnexion" => Ok(ActionType::Deconnexion),
            "validation" => Ok(ActionType::Validation),
            "annulation" => Ok(ActionType::Annulation),
            "import" => Ok(ActionType::Import),
            "export" => Ok(ActionType::Export),
            "autre" => Ok(ActionType::Autre),
            _ => Err(format!("Invalid action type: {}", s)),
        }
    }
}

/// Functional area of the application that owns an entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Finance,
    Utilisateurs,
    Vehicules,
    Maintenance,
    Planning,
    #[default]
    Parametres,
}

impl Module {
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Finance => "finance",
            Module::Utilisateurs => "utilisateurs",
            Module::Vehicules => "vehicules",
            Module::Maintenance => "maintenance",
            Module::Planning => "planning",
            Module::Parametres => "parametres",
        }
    }

    /// Look up the owning module of a known entity type.
    ///
    /// Returns `None` for entities outside the fixed table; see
    /// [`Module::for_entity`] for the defaulting variant.
    pub fn from_entity(entite: &str) -> Option<Module> {
        match entite.trim().to_lowercase().as_str() {
            "recette" | "depense" => Some(Module::Finance),
            "utilisateur" | "role" => Some(Module::Utilisateurs),
            "vehicule" | "marque" | "modele" => Some(Module::Vehicules),
            "intervention" | "piece" => Some(Module::Maintenance),
            "trajet" | "chauffeur" => Some(Module::Planning),
            _ => None,
        }
    }

    /// Derive the module for an entity, falling back to `parametres`.
    ///
    /// The fallback is logged: an unmapped entity usually means a caller
    /// passed a misspelled or new entity name.
    pub fn for_entity(entite: &str) -> Module {
        Module::from_entity(entite).unwrap_or_else(|| {
            warn!(
                entite = entite,
                "Unmapped entity, filing history entry under module 'parametres'"
            );
            Module::Parametres
        })
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Module {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "finance" => Ok(Module::Finance),
            "utilisateurs" => Ok(Module::Utilisateurs),
            "vehicules" => Ok(Module::Vehicules),
            "maintenance" => Ok(Module::Maintenance),
            "planning" => Ok(Module::Planning),
            "parametres" => Ok(Module::Parametres),
            _ => Err(format!("Invalid module: {}", s)),
        }
    }
}

/// Browser name and major version parsed from a user agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrowserInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Client screen characteristics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScreenResolution {
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_depth: Option<u32>,
}

/// Best-effort diagnostic metadata captured at write time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigateur: Option<BrowserInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ScreenResolution>,
}

impl EntryMetadata {
    pub fn is_empty(&self) -> bool {
        self.ip.is_none()
            && self.user_agent.is_none()
            && self.navigateur.is_none()
            && self.resolution.is_none()
    }
}

/// ISO-8601 timestamps with exactly three fractional digits and a `Z` suffix
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(deserializer)
    }
}

fn default_user() -> String {
    DEFAULT_USER.to_string()
}

/// One recorded action
///
/// Entries are built once by the history engine and handed out as clones;
/// the stored copy is never edited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    #[serde(default)]
    pub id_reference: String,
    #[serde(rename = "type")]
    pub action: ActionType,
    #[serde(default)]
    pub module: Module,
    #[serde(default)]
    pub entite: String,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_user")]
    pub utilisateur: String,
    #[serde(default)]
    pub commentaire: String,
    #[serde(default)]
    pub donnees: serde_json::Value,
    #[serde(flatten)]
    pub metadata: EntryMetadata,
}

impl LogEntry {
    /// Text searched by the `recherche` criterion
    pub fn search_text(&self) -> String {
        [
            self.action.as_str(),
            self.entite.as_str(),
            self.utilisateur.as_str(),
            self.commentaire.as_str(),
            &self.donnees.to_string(),
        ]
        .join(" ")
        .to_lowercase()
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let utilisateur = if self.utilisateur.is_empty() {
            "Système"
        } else {
            self.utilisateur.as_str()
        };
        write!(
            f,
            "{} - {} [{}] {} {}: {}",
            self.timestamp.format("%d/%m/%Y %H:%M:%S"),
            utilisateur,
            self.module,
            self.action,
            self.entite,
            self.commentaire
        )
    }
}
