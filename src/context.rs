// 📚 Reference Data - acteurs, organes, sénateurs, textes
// Read-only lookups passed explicitly into the engine instead of module-level caches

use crate::error::RecordError;
use crate::models::{Chambre, LectureRef};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Identity of a legislative text as referenced by bulk documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TexteRef {
    pub chambre: Chambre,
    /// Législature or session, same convention as `LectureRef::session`
    pub session: String,
    pub numero: u32,
    /// Long title, quoted by some amendements instead of a subdivision
    #[serde(default)]
    pub titre_long: Option<String>,
}

/// Upstream reference data, loaded once and shared by every batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceData {
    /// Acteur uid → display name ("PA719582" → "Jean Dupont")
    #[serde(default)]
    pub acteurs: HashMap<String, String>,

    /// Organe uid → libellé (political groups)
    #[serde(default)]
    pub organes: HashMap<String, String>,

    /// Sénateur matricule → group
    #[serde(default)]
    pub senateurs: HashMap<String, String>,

    /// Texte uid → texte identity
    #[serde(default)]
    pub textes: HashMap<String, TexteRef>,
}

impl ReferenceData {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse reference data")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read reference data {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn auteur_name(&self, uid: &str) -> Result<&str, RecordError> {
        self.acteurs
            .get(uid)
            .map(String::as_str)
            .ok_or_else(|| RecordError::UnknownAuteur(uid.to_string()))
    }

    pub fn groupe_name(&self, uid: &str) -> Result<&str, RecordError> {
        self.organes
            .get(uid)
            .map(String::as_str)
            .ok_or_else(|| RecordError::UnknownGroupe(uid.to_string()))
    }

    /// Group of a sénateur, if known
    pub fn senateur_groupe(&self, matricule: &str) -> Option<&str> {
        self.senateurs.get(matricule).map(String::as_str)
    }

    pub fn texte(&self, uid: &str) -> Option<&TexteRef> {
        self.textes.get(uid)
    }

    /// Long title of the texte a lecture reads, if known
    pub fn texte_title(&self, lecture: &LectureRef) -> Option<&str> {
        self.textes
            .values()
            .find(|texte| {
                texte.chambre == lecture.chambre
                    && texte.session == lecture.session
                    && texte.numero == lecture.texte
            })
            .and_then(|texte| texte.titre_long.as_deref())
    }
}
