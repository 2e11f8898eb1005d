// 🏗️ Source Normalizers - one adapter per upstream feed
// Sénat tabular export, Sénat discussion order, AN bulk documents ("liasse")
//
// Each feed is mapped to exactly one RawRecord variant at this boundary, so the
// engine only ever matches on concrete shapes.

use crate::context::ReferenceData;
use crate::division::{parse_citation, parse_citation_with_title, InsertPosition, SubdivisionKind, SubdivisionRef};
use crate::error::{BatchError, RecordError};
use crate::models::{AmendementKey, Outcome, GOUVERNEMENT};
use crate::multiplier::{parse_numero, parse_partie};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// Sénat "jeu complet" tab-separated export
    SenatCsv,
    /// Sénat "liste_discussion" JSON (order of discussion)
    Derouleur,
    /// AN bulk amendement document
    Liasse,
}

impl SourceType {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            SourceType::SenatCsv => "Sénat (jeu complet)",
            SourceType::Derouleur => "Sénat (dérouleur)",
            SourceType::Liasse => "Assemblée nationale (liasse)",
        }
    }

    /// Short code for internal use
    pub fn code(&self) -> &str {
        match self {
            SourceType::SenatCsv => "senat_csv",
            SourceType::Derouleur => "derouleur",
            SourceType::Liasse => "liasse",
        }
    }
}

/// Raw upstream record, one variant per feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RawRecord {
    Tabular(TabularRow),
    Discussion(DiscussionRow),
    Liasse(LiasseAmendement),
}

impl RawRecord {
    /// Identity used in error reports: upstream uid when there is one, else the number text
    pub fn identity(&self) -> String {
        match self {
            RawRecord::Tabular(row) => row.numero.trim().to_string(),
            RawRecord::Discussion(row) => row.id_amendement.clone(),
            RawRecord::Liasse(item) => item.uid.clone(),
        }
    }

    /// Lecture this record claims to belong to (bulk documents only)
    pub fn lecture_claim(&self) -> Option<LectureClaim> {
        match self {
            RawRecord::Liasse(item) => Some(item.lecture_claim()),
            _ => None,
        }
    }

    /// Reduce to the common record. `texte_title` is the long title of the
    /// lecture's texte, which some citations quote instead of a subdivision.
    pub fn normalize(
        &self,
        ctx: &ReferenceData,
        texte_title: Option<&str>,
    ) -> Result<AmendementRecord, RecordError> {
        match self {
            RawRecord::Tabular(row) => row.normalize(ctx, texte_title),
            RawRecord::Liasse(item) => item.normalize(ctx, texte_title),
            RawRecord::Discussion(_) => Err(RecordError::MissingField("amendement content")),
        }
    }
}

/// Common shape every amendement source reduces to
#[derive(Debug, Clone, PartialEq)]
pub struct AmendementRecord {
    /// Upstream uid, used to resolve parent pointers inside a batch
    pub uid: Option<String>,
    pub key: AmendementKey,
    pub partie: Option<u8>,
    pub subdivision: SubdivisionRef,
    /// Whether the feed has parent pointers at all. When it does, a missing
    /// `parent_uid` means "no parent"; when it does not, the stored parent stays.
    pub carries_parent: bool,
    pub parent_uid: Option<String>,
    pub alinea: Option<u32>,
    pub auteur: String,
    pub matricule: Option<String>,
    pub groupe: Option<String>,
    pub date_depot: Option<NaiveDate>,
    pub sort: Outcome,
    pub corps: String,
    pub expose: String,
}

/// Lecture identity as declared by a bulk document item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LectureClaim {
    pub texte_uid: Option<String>,
    pub organe: Option<String>,
    pub partie: Option<u8>,
}

/// Output of a normalizer: records plus the lines that could not be read
#[derive(Debug, Clone)]
pub struct Batch {
    pub source: SourceType,
    pub records: Vec<RawRecord>,
    /// (identity, cause) for unreadable upstream lines
    pub errors: Vec<(String, String)>,
}

impl Batch {
    pub fn empty(source: SourceType) -> Self {
        Batch {
            source,
            records: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn new(source: SourceType, records: Vec<RawRecord>) -> Self {
        Batch {
            source,
            records,
            errors: Vec::new(),
        }
    }
}

// ============================================================================
// NORMALIZER TRAIT + FACTORY
// ============================================================================

/// SourceNormalizer - turns one upstream document into a batch of raw records
pub trait SourceNormalizer: Send + Sync {
    /// Parse the text of one upstream document
    fn parse(&self, input: &str) -> Result<Batch>;

    /// Get the source type this normalizer handles
    fn source_type(&self) -> SourceType;

    /// Get normalizer version (for provenance tracking)
    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Read and parse a file. Sénat exports are cp1252, everything else UTF-8.
    fn parse_file(&self, file_path: &Path) -> Result<Batch> {
        let bytes = std::fs::read(file_path)
            .with_context(|| format!("Failed to open file: {}", file_path.display()))?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => decode_cp1252(err.as_bytes()),
        };
        self.parse(&text)
            .with_context(|| format!("Failed to parse {}", file_path.display()))
    }
}

/// Detect source type from filename
///
/// - `jeu_complet_2019-2020_139.csv` → SenatCsv
/// - `liste_discussion.json`, `derouleur_*.json` → Derouleur
/// - `liasse_*.xml` → Liasse
pub fn detect_source(file_path: &Path) -> Result<SourceType> {
    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let filename_lower = filename.to_lowercase();

    if filename_lower.contains("liste_discussion") || filename_lower.contains("derouleur") {
        return Ok(SourceType::Derouleur);
    }

    if filename_lower.contains("liasse") {
        return Ok(SourceType::Liasse);
    }

    if filename_lower.contains("jeu_complet")
        || filename_lower.ends_with(".csv")
        || filename_lower.ends_with(".tsv")
    {
        return Ok(SourceType::SenatCsv);
    }

    Err(anyhow::anyhow!(
        "Could not detect source type from filename: {}",
        filename
    ))
}

/// Get the normalizer for a source type
pub fn get_normalizer(source_type: SourceType) -> Box<dyn SourceNormalizer> {
    match source_type {
        SourceType::SenatCsv => Box::new(SenatCsvNormalizer),
        SourceType::Derouleur => Box::new(DerouleurNormalizer),
        SourceType::Liasse => Box::new(LiasseNormalizer),
    }
}

/// Load one upstream file. A missing file is "not found upstream": zero records.
pub fn load_source(file_path: &Path) -> Result<Batch> {
    let source = detect_source(file_path)?;
    if !file_path.exists() {
        warn!("Could not fetch {}: not found", file_path.display());
        return Ok(Batch::empty(source));
    }
    let batch = get_normalizer(source).parse_file(file_path)?;
    debug!(
        "Loaded {} records from {} ({})",
        batch.records.len(),
        file_path.display(),
        source.name()
    );
    Ok(batch)
}

// ============================================================================
// SÉNAT TABULAR EXPORT
// ============================================================================

/// Columns of the Sénat export that we use (names carry their upstream trailing spaces)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabularRow {
    #[serde(rename = "Numéro ")]
    pub numero: String,
    #[serde(rename = "Subdivision ")]
    pub subdivision: String,
    #[serde(rename = "Alinéa", default)]
    pub alinea: String,
    #[serde(rename = "Auteur ")]
    pub auteur: String,
    #[serde(rename = "Fiche Sénateur", default)]
    pub fiche_senateur: String,
    #[serde(rename = "Date de dépôt ", default)]
    pub date_depot: String,
    #[serde(rename = "Dispositif ", default)]
    pub dispositif: String,
    #[serde(rename = "Objet ", default)]
    pub objet: String,
    #[serde(rename = "Sort ", default)]
    pub sort: String,
}

impl TabularRow {
    fn normalize(&self, ctx: &ReferenceData, texte_title: Option<&str>) -> Result<AmendementRecord, RecordError> {
        let (num, rectif) = parse_numero(&self.numero)?;
        let matricule = extract_matricule(&self.fiche_senateur)?;
        let groupe = matricule
            .as_deref()
            .and_then(|m| ctx.senateur_groupe(m))
            .map(str::to_string);

        Ok(AmendementRecord {
            uid: None,
            key: AmendementKey::new(num, rectif),
            partie: parse_partie(&self.numero),
            subdivision: parse_citation_with_title(&self.subdivision, texte_title),
            carries_parent: false,
            parent_uid: None,
            alinea: self.alinea.trim().parse().ok(),
            auteur: self.auteur.trim().to_string(),
            matricule,
            groupe,
            date_depot: parse_date(&self.date_depot)?,
            sort: Outcome::from_text(&self.sort),
            corps: clean_html(&self.dispositif),
            expose: clean_html(&self.objet),
        })
    }
}

/// Number of columns in a well-formed export line
const TABULAR_COLUMNS: usize = 12;

pub struct SenatCsvNormalizer;

impl SourceNormalizer for SenatCsvNormalizer {
    fn parse(&self, input: &str) -> Result<Batch> {
        let mut batch = Batch::empty(SourceType::SenatCsv);

        // The export may start with an Excel "sep=" hint before the header.
        let mut lines = input
            .lines()
            .skip_while(|line| line.trim().is_empty() || line.starts_with("sep="))
            .enumerate();

        let Some((_, header)) = lines.next() else {
            return Ok(batch);
        };
        let header = filter_line(header).context("Malformed header line")?;

        let mut repaired = vec![header];
        for (index, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            match filter_line(line) {
                Ok(line) => repaired.push(line),
                Err(err) => {
                    warn!("Line {}: {}", index + 1, err);
                    batch.errors.push((format!("line {}", index + 1), err.to_string()));
                }
            }
        }

        let joined = repaired.join("\n");
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .has_headers(true)
            .from_reader(joined.as_bytes());

        for (index, result) in reader.deserialize::<TabularRow>().enumerate() {
            match result {
                Ok(row) => batch.records.push(RawRecord::Tabular(row)),
                Err(err) => batch
                    .errors
                    .push((format!("row {}", index + 1), err.to_string())),
            }
        }

        Ok(batch)
    }

    fn source_type(&self) -> SourceType {
        SourceType::SenatCsv
    }
}

/// Repair lines where unescaped tabs inside `<body>…</body>` split a cell
pub fn filter_line(line: &str) -> Result<String, RecordError> {
    let mut merged: Vec<String> = Vec::new();
    let mut chunks = line.split('\t');
    while let Some(chunk) = chunks.next() {
        let mut chunk = chunk.to_string();
        while chunk.starts_with("<body>") && !chunk.trim_end().ends_with("</body>") {
            match chunks.next() {
                Some(next) => {
                    chunk.push(' ');
                    chunk.push_str(next);
                }
                None => break,
            }
        }
        merged.push(chunk);
    }
    if merged.len() != TABULAR_COLUMNS {
        return Err(RecordError::MalformedLine(line.to_string()));
    }
    Ok(merged.join("\t"))
}

fn fiche_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w/_]+(\d{5}[\da-z])\.html$").expect("fiche regex is valid"))
}

/// Sénateur registry id from a profile URL: `/senateur/dupont_jean01034a.html` → `01034A`
pub fn extract_matricule(url: &str) -> Result<Option<String>, RecordError> {
    let url = url.trim();
    if url.is_empty() {
        return Ok(None);
    }
    // Drop "scheme://host" or "//host" to keep the path only
    let path = match url.split_once("//") {
        Some((scheme, rest)) if scheme.is_empty() || scheme.ends_with(':') => {
            rest.find('/').map_or("", |i| &rest[i..])
        }
        _ => url,
    };
    let path = path.split(['?', '#']).next().unwrap_or("");

    fiche_re()
        .captures(path)
        .map(|caps| Some(caps[1].to_uppercase()))
        .ok_or_else(|| RecordError::InvalidMatricule(url.to_string()))
}

// ============================================================================
// SÉNAT DISCUSSION ORDER ("dérouleur")
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionRow {
    pub id_amendement: String,
    pub num: String,
    #[serde(default)]
    pub is_sous_amendement: Option<String>,
    #[serde(default)]
    pub id_amendement_pere: Option<String>,
    #[serde(default = "false_string")]
    pub is_discussion_commune: String,
    #[serde(default)]
    pub id_discussion_commune: Option<String>,
    #[serde(default = "false_string")]
    pub is_identique: String,
    #[serde(default)]
    pub id_identique: Option<String>,
}

fn false_string() -> String {
    "false".to_string()
}

#[derive(Debug, Deserialize)]
struct DerouleurDocument {
    #[serde(rename = "Subdivisions", default)]
    subdivisions: Vec<DerouleurSubdivision>,
}

#[derive(Debug, Deserialize)]
struct DerouleurSubdivision {
    #[serde(rename = "Amendements", default)]
    amendements: Vec<DiscussionRow>,
}

pub struct DerouleurNormalizer;

impl SourceNormalizer for DerouleurNormalizer {
    fn parse(&self, input: &str) -> Result<Batch> {
        if input.trim().is_empty() {
            warn!("Empty discussion document");
            return Ok(Batch::empty(SourceType::Derouleur));
        }
        let document: DerouleurDocument =
            serde_json::from_str(input).context("Failed to parse discussion JSON")?;

        let records = document
            .subdivisions
            .into_iter()
            .flat_map(|subdiv| subdiv.amendements)
            .map(RawRecord::Discussion)
            .collect();
        Ok(Batch::new(SourceType::Derouleur, records))
    }

    fn source_type(&self) -> SourceType {
        SourceType::Derouleur
    }
}

// ============================================================================
// AN BULK DOCUMENTS ("liasse")
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiasseAmendement {
    pub uid: String,
    pub numero_long: Option<String>,
    pub etat: Option<String>,
    pub identifiant: Identifiant,
    pub signataires: Signataires,
    pub pointeur_fragment_texte: PointeurFragmentTexte,
    pub date_depot: Option<String>,
    pub sort: Option<SortNode>,
    pub corps: Corps,
    pub amendement_parent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Identifiant {
    pub numero: Option<String>,
    pub saisine: Saisine,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Saisine {
    pub ref_texte_legislatif: Option<String>,
    pub organe_examen: Option<String>,
    #[serde(rename = "numeroPartiePLF")]
    pub numero_partie_plf: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Signataires {
    pub auteur: Auteur,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Auteur {
    pub type_auteur: Option<String>,
    pub acteur_ref: Option<String>,
    pub groupe_politique_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointeurFragmentTexte {
    pub division: Division,
    pub alinea: Alinea,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Division {
    pub titre: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    #[serde(rename = "avant_A_Apres")]
    pub avant_a_apres: Option<String>,
    pub division_rattachee: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Alinea {
    pub numero: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SortNode {
    pub sort_en_seance: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Corps {
    pub dispositif: Option<String>,
    pub expose_sommaire: Option<String>,
}

impl LiasseAmendement {
    fn lecture_claim(&self) -> LectureClaim {
        let saisine = &self.identifiant.saisine;
        LectureClaim {
            texte_uid: saisine.ref_texte_legislatif.clone(),
            organe: saisine.organe_examen.clone(),
            partie: saisine
                .numero_partie_plf
                .as_deref()
                .filter(|p| *p != "0")
                .and_then(|p| p.trim().parse().ok()),
        }
    }

    fn subdivision(&self, texte_title: Option<&str>) -> Result<SubdivisionRef, RecordError> {
        let division = &self.pointeur_fragment_texte.division;
        let kind = division
            .type_
            .as_deref()
            .ok_or(RecordError::MissingField("division type"))?;
        let position = parse_avant_apres(division.avant_a_apres.as_deref().unwrap_or(""));

        if kind == "TITRE" {
            return Ok(SubdivisionRef::new(SubdivisionKind::Title, "", "", position));
        }

        if kind == "CHAPITRE" {
            if let Some(rattachee) = division.division_rattachee.as_deref().filter(|d| !d.is_empty()) {
                return Ok(parse_citation(rattachee));
            }
            let num: String = division
                .titre
                .as_deref()
                .unwrap_or("")
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect();
            return Ok(SubdivisionRef::new(SubdivisionKind::Chapter, num, "", position));
        }

        let titre = division
            .titre
            .as_deref()
            .ok_or(RecordError::MissingField("division titre"))?;
        let mut subdivision = parse_citation_with_title(titre, texte_title);
        subdivision.position = position;
        Ok(subdivision)
    }

    fn normalize(&self, ctx: &ReferenceData, texte_title: Option<&str>) -> Result<AmendementRecord, RecordError> {
        let subdivision = self.subdivision(texte_title)?;

        if self.identifiant.saisine.ref_texte_legislatif.is_none() {
            return Err(RecordError::MissingField("refTexteLegislatif"));
        }

        let auteur = &self.signataires.auteur;
        let (auteur_name, matricule, groupe) =
            if auteur.type_auteur.as_deref() == Some("Gouvernement") {
                (GOUVERNEMENT.to_string(), None, None)
            } else {
                let acteur_uid = auteur
                    .acteur_ref
                    .as_deref()
                    .ok_or(RecordError::MissingField("auteur acteurRef"))?;
                let groupe_uid = auteur
                    .groupe_politique_ref
                    .as_deref()
                    .ok_or(RecordError::MissingField("auteur groupePolitiqueRef"))?;
                (
                    ctx.auteur_name(acteur_uid)?.to_string(),
                    Some(acteur_uid.to_string()),
                    Some(ctx.groupe_name(groupe_uid)?.to_string()),
                )
            };

        let numero = self
            .identifiant
            .numero
            .as_deref()
            .ok_or(RecordError::MissingField("numero"))?;
        let (num, rectif) = parse_numero(numero)?;

        let alinea_text = self
            .pointeur_fragment_texte
            .alinea
            .numero
            .as_deref()
            .filter(|text| !text.trim().is_empty());
        let alinea = match alinea_text {
            Some(text) => Some(
                text.trim()
                    .parse()
                    .map_err(|_| RecordError::InvalidNumero(text.to_string()))?,
            ),
            None => None,
        };

        Ok(AmendementRecord {
            uid: Some(self.uid.clone()),
            key: AmendementKey::new(num, rectif),
            partie: self.lecture_claim().partie,
            subdivision,
            carries_parent: true,
            parent_uid: self.amendement_parent.clone().filter(|p| !p.is_empty()),
            alinea,
            auteur: auteur_name,
            matricule,
            groupe,
            date_depot: parse_date(self.date_depot.as_deref().unwrap_or(""))?,
            sort: Outcome::from_text(&get_sort(
                self.sort.as_ref().and_then(|s| s.sort_en_seance.as_deref()),
                self.etat.as_deref(),
            )),
            corps: clean_html(self.corps.dispositif.as_deref().unwrap_or("")),
            expose: clean_html(self.corps.expose_sommaire.as_deref().unwrap_or("")),
        })
    }
}

/// Explicit outcome, else the workflow state unless it is still in progress
pub fn get_sort(sort: Option<&str>, etat: Option<&str>) -> String {
    if let Some(sort) = sort {
        return sort.to_string();
    }
    match etat {
        Some(etat) if etat != "En traitement" && etat != "A discuter" => etat.to_string(),
        _ => String::new(),
    }
}

fn parse_avant_apres(text: &str) -> InsertPosition {
    match text.trim().to_lowercase().as_str() {
        "a" | "apres" | "après" => InsertPosition::After,
        "av" | "avant" => InsertPosition::Before,
        _ => InsertPosition::None,
    }
}

/// `<amendements>` root: one `<amendement>` element per item
#[derive(Debug, Deserialize)]
struct LiasseDocument {
    #[serde(rename = "amendement", default)]
    amendements: Vec<LiasseAmendement>,
}

/// Local name of the root element
fn root_tag(input: &str) -> Result<String, BatchError> {
    let mut reader = Reader::from_str(input);
    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(element)) | Ok(XmlEvent::Empty(element)) => {
                return Ok(String::from_utf8_lossy(element.local_name().as_ref()).into_owned());
            }
            Ok(XmlEvent::Eof) => {
                return Err(BatchError::MalformedDocument("Empty XML file".to_string()));
            }
            Ok(_) => {}
            Err(err) => {
                return Err(BatchError::MalformedDocument(format!("Not a valid XML file: {}", err)));
            }
        }
    }
}

pub struct LiasseNormalizer;

impl SourceNormalizer for LiasseNormalizer {
    fn parse(&self, input: &str) -> Result<Batch> {
        if root_tag(input)? != "amendements" {
            return Err(BatchError::MalformedDocument(
                "Expecting 'amendements' as a root element".to_string(),
            )
            .into());
        }
        let document: LiasseDocument = quick_xml::de::from_str(input)
            .map_err(|e| BatchError::MalformedDocument(format!("Not a valid XML file: {}", e)))?;

        let mut records = Vec::new();
        for item in document.amendements {
            if item.etat.as_deref() == Some("A déposer") {
                warn!(
                    "Ignoring amendement {} (à déposer)",
                    item.numero_long.as_deref().unwrap_or(&item.uid)
                );
                continue;
            }
            records.push(RawRecord::Liasse(item));
        }
        Ok(Batch::new(SourceType::Liasse, records))
    }

    fn source_type(&self) -> SourceType {
        SourceType::Liasse
    }
}

// ============================================================================
// FIELD HELPERS
// ============================================================================

/// "2019-11-21", "2019-11-21T10:00:00" or "21/11/2019"; empty → None
pub fn parse_date(text: &str) -> Result<Option<NaiveDate>, RecordError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let day = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(day, "%d/%m/%Y"))
        .map(Some)
        .map_err(|_| RecordError::InvalidDate(text.to_string()))
}

/// Upstream booleans are the strings "true" / "false"
pub fn parse_bool(text: &str) -> Result<bool, RecordError> {
    match text.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(RecordError::InvalidBool(other.to_string())),
    }
}

/// Decode entities and drop the `<body>` wrapper of upstream HTML fragments
pub fn clean_html(html: &str) -> String {
    let text = html
        .trim()
        .trim_start_matches("<body>")
        .trim_end_matches("</body>");
    text.replace("&nbsp;", "\u{a0}")
        .replace("&#160;", "\u{a0}")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&rsquo;", "\u{2019}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Windows-1252 → UTF-8
pub fn decode_cp1252(bytes: &[u8]) -> String {
    const HIGH: [char; 32] = [
        '€', '\u{81}', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', '\u{8d}', 'Ž',
        '\u{8f}', '\u{90}', '‘', '’', '“', '”', '•', '–', '—', '˜', '™', 'š', '›', 'œ',
        '\u{9d}', 'ž', 'Ÿ',
    ];
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9f => HIGH[(b - 0x80) as usize],
            _ => b as char,
        })
        .collect()
}
