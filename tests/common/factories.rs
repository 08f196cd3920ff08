//! Test factories for generating test data
//!
//! Factories create randomized request bodies, useful when a test needs
//! many distinct entries.

use std::sync::atomic::{AtomicU64, Ordering};

use fake::faker::lorem::en::Sentence;
use fake::faker::name::en::Name;
use fake::Fake;
use rand::seq::SliceRandom;
use serde_json::{json, Value};

const ENTITIES: [&str; 8] = [
    "recette",
    "depense",
    "vehicule",
    "marque",
    "intervention",
    "piece",
    "trajet",
    "chauffeur",
];

const ACTIONS: [&str; 4] = ["creation", "modification", "suppression", "validation"];

/// Factory for history entry request bodies
pub struct EntryFactory {
    counter: AtomicU64,
}

impl Default for EntryFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryFactory {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// A random structured body for a known entity
    pub fn create(&self) -> Value {
        let mut rng = rand::thread_rng();
        let entite = ENTITIES.choose(&mut rng).copied().unwrap_or("recette");
        let action = ACTIONS.choose(&mut rng).copied().unwrap_or("creation");
        self.create_for(action, entite)
    }

    /// A structured body with a random user and comment
    pub fn create_for(&self, action: &str, entite: &str) -> Value {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let utilisateur: String = Name().fake();
        let commentaire: String = Sentence(3..8).fake();
        json!({
            "type": action,
            "entite": entite,
            "donnees": {"sequence": n},
            "utilisateur": utilisateur,
            "commentaire": commentaire,
            "idReference": format!("ref_test_{}", n)
        })
    }

    /// `count` random bodies
    pub fn batch(&self, count: usize) -> Vec<Value> {
        (0..count).map(|_| self.create()).collect()
    }
}
