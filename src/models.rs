// 🏛️ Domain Model - lectures, articles, amendements
// Natural keys: Article = (lecture, SubdivisionRef), Amendement = (lecture, num, rectif)

use crate::division::SubdivisionRef;
use crate::multiplier::format_numero;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

// ============================================================================
// LECTURE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chambre {
    An,
    Senat,
}

impl Chambre {
    pub fn code(&self) -> &'static str {
        match self {
            Chambre::An => "an",
            Chambre::Senat => "senat",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Chambre::An => "Assemblée nationale",
            Chambre::Senat => "Sénat",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_lowercase().as_str() {
            "an" => Some(Chambre::An),
            "senat" | "sénat" => Some(Chambre::Senat),
            _ => None,
        }
    }
}

/// One reading of one text by one organe: the scope of articles and amendements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LectureRef {
    pub chambre: Chambre,
    /// Législature ("15") for the AN, session ("2019-2020") for the Sénat
    pub session: String,
    pub texte: u32,
    pub organe: String,
    /// Budget-bill part (1 or 2), None for ordinary texts
    pub partie: Option<u8>,
}

impl LectureRef {
    /// "an.15.1234.PO717460", with "-2" appended for a budget-bill part
    pub fn url_key(&self) -> String {
        let mut key = format!(
            "{}.{}.{}.{}",
            self.chambre.code(),
            self.session,
            self.texte,
            self.organe
        );
        if let Some(partie) = self.partie {
            key.push_str(&format!("-{}", partie));
        }
        key
    }
}

impl fmt::Display for LectureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url_key())
    }
}

// ============================================================================
// ARTICLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub pk: i64,
    pub lecture_pk: i64,
    pub subdivision: SubdivisionRef,
    /// Editorial title: set by humans or once by default, never overwritten by fetches
    pub titre: String,
    /// Machine-fetched body paragraphs, overwritten by every text fetch
    pub contenu: Vec<String>,
}

// ============================================================================
// AMENDEMENT
// ============================================================================

/// Outcome of an amendement ("sort")
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Outcome {
    #[default]
    Empty,
    Adopted,
    Rejected,
    Withdrawn,
    Inadmissible,
    Lapsed,
    /// Anything else upstream sends ("non soutenu", "satisfait"...), kept verbatim
    Other(String),
}

impl Outcome {
    pub fn from_text(text: &str) -> Self {
        let normalized = text.trim().to_lowercase();
        match normalized.as_str() {
            "" => Outcome::Empty,
            s if s.starts_with("adopt") => Outcome::Adopted,
            s if s.starts_with("rejet") => Outcome::Rejected,
            s if s.starts_with("retiré") || s.starts_with("retire") => Outcome::Withdrawn,
            s if s.starts_with("irrecevable") => Outcome::Inadmissible,
            s if s.starts_with("tombé") || s.starts_with("tombe") => Outcome::Lapsed,
            _ => Outcome::Other(text.trim().to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Outcome::Empty => "",
            Outcome::Adopted => "adopté",
            Outcome::Rejected => "rejeté",
            Outcome::Withdrawn => "retiré",
            Outcome::Inadmissible => "irrecevable",
            Outcome::Lapsed => "tombé",
            Outcome::Other(text) => text,
        }
    }

    /// Withdrawn, inadmissible or lapsed: will not be discussed
    pub fn is_abandoned(&self) -> bool {
        matches!(
            self,
            Outcome::Withdrawn | Outcome::Inadmissible | Outcome::Lapsed
        )
    }
}

impl From<String> for Outcome {
    fn from(text: String) -> Self {
        Outcome::from_text(&text)
    }
}

impl From<Outcome> for String {
    fn from(outcome: Outcome) -> Self {
        outcome.code().to_string()
    }
}

/// Natural key of an amendement within a lecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AmendementKey {
    pub num: u32,
    pub rectif: u32,
}

impl AmendementKey {
    pub fn new(num: u32, rectif: u32) -> Self {
        AmendementKey { num, rectif }
    }
}

impl fmt::Display for AmendementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_numero(self.num, self.rectif))
    }
}

/// Upstream-authoritative fields, overwritten on every import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendementFields {
    pub article_pk: Option<i64>,
    pub parent_pk: Option<i64>,
    pub alinea: Option<u32>,
    pub auteur: String,
    /// Registry id, absent for the government
    pub matricule: Option<String>,
    pub groupe: Option<String>,
    pub date_depot: Option<NaiveDate>,
    pub sort: Outcome,
    pub corps: String,
    pub expose: String,
}

impl AmendementFields {
    /// SHA-256 over every structural field, used to detect no-op re-imports
    pub fn structural_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{:?}\u{1f}{:?}\u{1f}{:?}\u{1f}{}\u{1f}{:?}\u{1f}{:?}\u{1f}{:?}\u{1f}{}\u{1f}{}\u{1f}{}",
            self.article_pk,
            self.parent_pk,
            self.alinea,
            self.auteur,
            self.matricule,
            self.groupe,
            self.date_depot,
            self.sort.code(),
            self.corps,
            self.expose,
        ));
        format!("{:x}", hasher.finalize())
    }

    /// Names of the fields that differ from `other`
    pub fn changed_fields(&self, other: &AmendementFields) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.article_pk != other.article_pk {
            changed.push("article");
        }
        if self.parent_pk != other.parent_pk {
            changed.push("parent");
        }
        if self.alinea != other.alinea {
            changed.push("alinea");
        }
        if self.auteur != other.auteur {
            changed.push("auteur");
        }
        if self.matricule != other.matricule {
            changed.push("matricule");
        }
        if self.groupe != other.groupe {
            changed.push("groupe");
        }
        if self.date_depot != other.date_depot {
            changed.push("date_depot");
        }
        if self.sort != other.sort {
            changed.push("sort");
        }
        if self.corps != other.corps {
            changed.push("corps");
        }
        if self.expose != other.expose {
            changed.push("expose");
        }
        changed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amendement {
    pub pk: i64,
    pub lecture_pk: i64,
    pub num: u32,
    pub rectif: u32,

    #[serde(flatten)]
    pub fields: AmendementFields,

    // ========================================================================
    // DISCUSSION (set by the discussion-order enricher only)
    // ========================================================================
    /// 1-based rank in the discussion; None = not (or no longer) scheduled
    pub position: Option<u32>,
    pub discussion_group_id: Option<i64>,
    pub identical: Option<bool>,

    pub structural_hash: String,
}

impl Amendement {
    pub fn key(&self) -> AmendementKey {
        AmendementKey::new(self.num, self.rectif)
    }

    /// "42 rect. bis"
    pub fn num_disp(&self) -> String {
        format_numero(self.num, self.rectif)
    }

    pub fn gouvernemental(&self) -> bool {
        self.fields.auteur == GOUVERNEMENT
    }

    pub fn is_abandoned(&self) -> bool {
        self.fields.sort.is_abandoned()
    }
}

/// Author name used for government amendements
pub const GOUVERNEMENT: &str = "LE GOUVERNEMENT";

// ============================================================================
// USER CONTENT (written by humans, only read here)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContent {
    pub avis: Option<String>,
    pub objet: Option<String>,
    pub reponse: Option<String>,
    pub comments: Option<String>,
}

impl UserContent {
    pub fn is_empty(&self) -> bool {
        self.avis.is_none() && self.objet.is_none() && self.reponse.is_none() && self.comments.is_none()
    }
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Append-only audit event ("Every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_text() {
        assert_eq!(Outcome::from_text(""), Outcome::Empty);
        assert_eq!(Outcome::from_text("Adopté"), Outcome::Adopted);
        assert_eq!(Outcome::from_text("retiré avant séance"), Outcome::Withdrawn);
        assert_eq!(Outcome::from_text("Irrecevable art. 40 C"), Outcome::Inadmissible);
        assert_eq!(Outcome::from_text("tombé"), Outcome::Lapsed);
        assert_eq!(
            Outcome::from_text("Non soutenu"),
            Outcome::Other("Non soutenu".to_string())
        );
    }

    #[test]
    fn test_abandoned_outcomes() {
        assert!(Outcome::Withdrawn.is_abandoned());
        assert!(Outcome::Inadmissible.is_abandoned());
        assert!(Outcome::Lapsed.is_abandoned());
        assert!(!Outcome::Adopted.is_abandoned());
        assert!(!Outcome::Empty.is_abandoned());
    }

    #[test]
    fn test_amendement_flags() {
        let amendement = Amendement {
            pk: 1,
            lecture_pk: 1,
            num: 12,
            rectif: 0,
            fields: AmendementFields {
                auteur: GOUVERNEMENT.to_string(),
                sort: Outcome::from_text("Retiré"),
                ..Default::default()
            },
            position: None,
            discussion_group_id: None,
            identical: None,
            structural_hash: String::new(),
        };
        assert!(amendement.gouvernemental());
        assert!(amendement.is_abandoned());
    }

    #[test]
    fn test_structural_hash_tracks_every_field() {
        let fields = AmendementFields {
            auteur: "M. Dupont".to_string(),
            corps: "<p>Supprimer cet article.</p>".to_string(),
            ..Default::default()
        };
        let same = fields.clone();
        assert_eq!(fields.structural_hash(), same.structural_hash());
        assert_eq!(fields.structural_hash().len(), 64, "SHA-256 hex digest");

        let mut changed = fields.clone();
        changed.sort = Outcome::Adopted;
        assert_ne!(fields.structural_hash(), changed.structural_hash());
        assert_eq!(fields.changed_fields(&changed), vec!["sort"]);
    }

    #[test]
    fn test_key_ordering_and_display() {
        let mut keys = vec![
            AmendementKey::new(12, 1),
            AmendementKey::new(3, 0),
            AmendementKey::new(12, 0),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                AmendementKey::new(3, 0),
                AmendementKey::new(12, 0),
                AmendementKey::new(12, 1)
            ]
        );
        assert_eq!(AmendementKey::new(12, 2).to_string(), "12 rect. bis");
    }

    #[test]
    fn test_lecture_url_key() {
        let lecture = LectureRef {
            chambre: Chambre::Senat,
            session: "2019-2020".to_string(),
            texte: 139,
            organe: "PO78718".to_string(),
            partie: Some(2),
        };
        assert_eq!(lecture.url_key(), "senat.2019-2020.139.PO78718-2");
        assert_eq!(Chambre::from_code("AN"), Some(Chambre::An));
    }
}
