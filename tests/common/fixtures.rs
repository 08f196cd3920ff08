//! Test fixtures for common test data
//!
//! Fixtures provide pre-defined request bodies that can be used across
//! multiple tests.

use serde_json::{json, Value};

/// Fixed business references for reproducible tests
pub mod refs {
    pub const RECETTE_REF: &str = "rec_2024_001";
    pub const VEHICULE_REF: &str = "veh_DK_1234";
}

/// Fleet activity: three finance actions and two vehicle actions, in
/// recording order.
pub fn fleet_scenario() -> Vec<Value> {
    vec![
        json!({
            "type": "creation",
            "entite": "recette",
            "donnees": {"montant": 150000, "client": "Transports Diallo"},
            "utilisateur": "awa",
            "commentaire": "Recette course Dakar-Thiès",
            "idReference": refs::RECETTE_REF
        }),
        json!({
            "type": "creation",
            "entite": "vehicule",
            "donnees": {"plaque": "DK-1234-A", "marque": "Toyota"},
            "utilisateur": "moussa",
            "commentaire": "Nouveau minibus",
            "idReference": refs::VEHICULE_REF
        }),
        json!({
            "type": "creation",
            "entite": "depense",
            "donnees": {"montant": 45000, "motif": "carburant"},
            "utilisateur": "awa",
            "commentaire": "Plein gasoil"
        }),
        json!({
            "type": "modification",
            "entite": "vehicule",
            "donnees": {"plaque": "DK-1234-A", "kilometrage": 120500},
            "utilisateur": "moussa",
            "commentaire": "Relevé kilométrique",
            "idReference": refs::VEHICULE_REF
        }),
        json!({
            "type": "modification",
            "entite": "recette",
            "donnees": {"montant": 155000},
            "utilisateur": "fatou",
            "commentaire": "Correction du montant",
            "idReference": refs::RECETTE_REF
        }),
    ]
}

/// User creation carrying credentials that must never be stored in clear
pub fn user_with_password() -> Value {
    json!({
        "type": "creation",
        "entite": "utilisateur",
        "donnees": {
            "nom": "Sow",
            "login": "isow",
            "password": "s3cret!",
            "profil": {"apiKey": "k-123", "langue": "fr"}
        },
        "utilisateur": "admin"
    })
}
