// ⚖️ Reconciliation Engine - upstream records → canonical amendements
//
// Per record:  find-or-create Article → find-or-create Amendement (lecture, num, rectif)
//              → overwrite structural fields → never touch user content
// Per batch:   cross-reading guard → normalize → two-pass parent resolution
//              → one transaction, per-record errors collected

use crate::context::ReferenceData;
use crate::db::{self, ACTOR};
use crate::error::{BatchError, RecordError};
use crate::models::{Amendement, AmendementFields, AmendementKey, Event, LectureRef};
use crate::sources::{AmendementRecord, Batch, LectureClaim, RawRecord, SourceType};
use anyhow::Result;
use regex::Regex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

// ============================================================================
// BATCH OUTCOME
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Every amendement produced by the batch, ordered by key
    pub amendements: Vec<Amendement>,
    pub created: BTreeSet<AmendementKey>,
    pub updated: usize,
    pub unchanged: usize,
    /// (identity, cause) for records that could not be reconciled
    pub errors: Vec<(String, String)>,
}

impl BatchOutcome {
    pub fn summary(&self) -> String {
        format!(
            "{} amendements: {} created, {} updated, {} unchanged, {} errors",
            self.amendements.len(),
            self.created.len(),
            self.updated,
            self.unchanged,
            self.errors.len()
        )
    }
}

// ============================================================================
// SINGLE RECORD
// ============================================================================

/// Reconcile one normalized record into storage.
///
/// Returns the resulting amendement and whether it was created. An identical
/// re-import writes nothing. Records from feeds without parent pointers keep
/// the stored parent, which the discussion order may have set; otherwise the
/// record's parent, or its absence, wins.
pub fn reconcile(
    conn: &Connection,
    lecture_pk: i64,
    record: &AmendementRecord,
    parent_pk: Option<i64>,
) -> Result<(Amendement, bool)> {
    if record.subdivision.is_error() {
        warn!(
            "Amendement {}: unparseable subdivision, attached to the error article",
            record.key
        );
    }
    let (article, _) = db::find_or_create_article(conn, lecture_pk, &record.subdivision)?;
    let existing = db::find_amendement(conn, lecture_pk, record.key)?;

    let parent_pk = match &existing {
        Some(existing) if !record.carries_parent => existing.fields.parent_pk,
        _ => parent_pk,
    };

    let fields = AmendementFields {
        article_pk: Some(article.pk),
        parent_pk,
        alinea: record.alinea,
        auteur: record.auteur.clone(),
        matricule: record.matricule.clone(),
        groupe: record.groupe.clone(),
        date_depot: record.date_depot,
        sort: record.sort.clone(),
        corps: record.corps.clone(),
        expose: record.expose.clone(),
    };

    match existing {
        Some(existing) if existing.structural_hash == fields.structural_hash() => {
            Ok((existing, false))
        }
        Some(existing) => {
            let changed = existing.fields.changed_fields(&fields);
            db::update_structural(conn, existing.pk, &fields)?;

            let event = Event::new(
                "amendement_updated",
                "amendement",
                &existing.pk.to_string(),
                serde_json::json!({
                    "num": existing.num_disp(),
                    "changed": changed,
                }),
                ACTOR,
            );
            db::insert_event(conn, &event)?;

            let structural_hash = fields.structural_hash();
            Ok((
                Amendement {
                    fields,
                    structural_hash,
                    ..existing
                },
                false,
            ))
        }
        None => {
            let amendement = db::insert_amendement(conn, lecture_pk, record.key, &fields)?;

            let event = Event::new(
                "amendement_created",
                "amendement",
                &amendement.pk.to_string(),
                serde_json::json!({
                    "num": amendement.num_disp(),
                    "article": article.subdivision.to_string(),
                    "auteur": amendement.fields.auteur,
                }),
                ACTOR,
            );
            db::insert_event(conn, &event)?;

            Ok((amendement, true))
        }
    }
}

// ============================================================================
// CROSS-READING GUARD
// ============================================================================

/// Reject bulk-document items declaring another lecture.
///
/// A claim that cannot be checked (no organe, unknown texte) only fails its
/// own record. A claim for another lecture fails the whole batch.
pub fn check_same_lecture(
    ctx: &ReferenceData,
    lecture: &LectureRef,
    claim: &LectureClaim,
) -> Result<Result<(), RecordError>, BatchError> {
    let Some(organe) = claim.organe.as_deref().filter(|o| !o.is_empty()) else {
        return Ok(Err(RecordError::MissingField("organeExamen")));
    };

    // A missing texte reference is reported at normalization.
    let Some(texte_uid) = claim.texte_uid.as_deref() else {
        return Ok(Ok(()));
    };
    let Some(texte) = ctx.texte(texte_uid) else {
        return Ok(Err(RecordError::UnknownTexte(texte_uid.to_string())));
    };

    let claimed = LectureRef {
        chambre: texte.chambre,
        session: texte.session.clone(),
        texte: texte.numero,
        organe: organe.to_string(),
        partie: claim.partie,
    };
    if &claimed != lecture {
        return Err(BatchError::LectureMismatch {
            expected: lecture.url_key(),
            found: claimed.url_key(),
        });
    }
    Ok(Ok(()))
}

// ============================================================================
// PARENT RESOLUTION
// ============================================================================

/// Where a record's parent comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParentSource {
    None,
    /// Declared in the same batch
    InBatch(AmendementKey),
    /// Already stored from a previous import
    Stored(i64),
}

fn uid_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^AM.+N(?P<num>\d+)$").expect("uid regex is valid"))
}

/// Amendement number embedded at the end of an AN uid
pub fn number_from_uid(uid: &str) -> Option<u32> {
    uid_number_re()
        .captures(uid)
        .and_then(|caps| caps["num"].parse().ok())
}

fn resolve_parent(
    conn: &Connection,
    lecture_pk: i64,
    parent_uid: Option<&str>,
    uid_map: &HashMap<String, AmendementKey>,
) -> Result<Result<ParentSource, RecordError>> {
    let Some(uid) = parent_uid else {
        return Ok(Ok(ParentSource::None));
    };
    if let Some(key) = uid_map.get(uid) {
        return Ok(Ok(ParentSource::InBatch(*key)));
    }
    let Some(num) = number_from_uid(uid) else {
        return Ok(Err(RecordError::UnknownParent(uid.to_string())));
    };
    Ok(match db::find_latest_revision(conn, lecture_pk, num)? {
        Some(parent) => Ok(ParentSource::Stored(parent.pk)),
        None => Err(RecordError::UnknownParent(num.to_string())),
    })
}

/// Number of in-batch ancestors, None on a cycle
fn parent_depth(index: usize, records: &[AmendementRecord], uid_index: &HashMap<String, usize>) -> Option<usize> {
    let mut depth = 0;
    let mut current = index;
    while let Some(&parent) = records[current]
        .parent_uid
        .as_deref()
        .and_then(|uid| uid_index.get(uid))
    {
        depth += 1;
        if depth > records.len() {
            return None;
        }
        current = parent;
    }
    Some(depth)
}

// ============================================================================
// BATCH
// ============================================================================

/// Reconcile a whole upstream batch against a lecture.
///
/// Fatal problems (another lecture, malformed document, storage failure) abort
/// before anything is written or roll the transaction back. Record-level
/// problems end up in `errors` and the rest of the batch goes through.
pub fn reconcile_batch(
    conn: &mut Connection,
    ctx: &ReferenceData,
    lecture: &LectureRef,
    batch: &Batch,
) -> Result<BatchOutcome, BatchError> {
    info!(
        "Reconciling {} records from {} on {}",
        batch.records.len(),
        batch.source.name(),
        lecture
    );

    if batch.source == SourceType::Derouleur {
        return Err(BatchError::MalformedDocument(
            "Discussion feeds carry no amendement content".to_string(),
        ));
    }

    let mut outcome = BatchOutcome {
        errors: batch.errors.clone(),
        ..Default::default()
    };

    // Guard: every claim is checked before anything is written
    let mut unchecked: HashSet<usize> = HashSet::new();
    for (index, raw) in batch.records.iter().enumerate() {
        let Some(claim) = raw.lecture_claim() else {
            continue;
        };
        if let Err(err) = check_same_lecture(ctx, lecture, &claim)? {
            warn!("Failed to import amendement {}: {}", raw.identity(), err);
            outcome.errors.push((raw.identity(), err.to_string()));
            unchecked.insert(index);
        }
    }

    // Normalize
    let texte_title = ctx.texte_title(lecture);
    let mut records: Vec<AmendementRecord> = Vec::new();
    let mut identities: Vec<String> = Vec::new();
    for (index, raw) in batch.records.iter().enumerate() {
        if unchecked.contains(&index) {
            continue;
        }
        match raw.normalize(ctx, texte_title) {
            Ok(record) => {
                if matches!(raw, RawRecord::Tabular(_)) && record.partie != lecture.partie {
                    debug!("Skipping amendement {}: other partie", raw.identity());
                    continue;
                }
                identities.push(raw.identity());
                records.push(record);
            }
            Err(err) => {
                warn!("Failed to import amendement {}: {}", raw.identity(), err);
                outcome.errors.push((raw.identity(), err.to_string()));
            }
        }
    }

    // Pass 1: every identity in the batch
    let mut uid_map: HashMap<String, AmendementKey> = HashMap::new();
    let mut uid_index: HashMap<String, usize> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        if let Some(uid) = &record.uid {
            uid_map.insert(uid.clone(), record.key);
            uid_index.insert(uid.clone(), index);
        }
    }

    // Parents before children, wherever they appear in the feed
    let mut order: Vec<(usize, usize)> = Vec::new();
    for index in 0..records.len() {
        match parent_depth(index, &records, &uid_index) {
            Some(depth) => order.push((depth, index)),
            None => {
                let err = RecordError::CircularParent(identities[index].clone());
                warn!("{}", err);
                outcome.errors.push((identities[index].clone(), err.to_string()));
            }
        }
    }
    order.sort_by_key(|(depth, _)| *depth);

    // Pass 2: apply, all or nothing
    let tx = conn.transaction()?;
    let lecture_pk = db::get_or_create_lecture(&tx, lecture)?;
    let mut reconciled: HashMap<AmendementKey, i64> = HashMap::new();
    let mut amendements: HashMap<AmendementKey, Amendement> = HashMap::new();

    for (_, index) in order {
        let record = &records[index];
        let identity = &identities[index];

        let parent = match resolve_parent(&tx, lecture_pk, record.parent_uid.as_deref(), &uid_map)? {
            Ok(parent) => parent,
            Err(err) => {
                warn!("Failed to import amendement {}: {}", identity, err);
                outcome.errors.push((identity.clone(), err.to_string()));
                continue;
            }
        };
        let parent_pk = match parent {
            ParentSource::None => None,
            ParentSource::Stored(pk) => Some(pk),
            ParentSource::InBatch(key) => match reconciled.get(&key) {
                Some(pk) => Some(*pk),
                None => {
                    let err = RecordError::UnknownParent(key.to_string());
                    warn!("Failed to import amendement {}: {}", identity, err);
                    outcome.errors.push((identity.clone(), err.to_string()));
                    continue;
                }
            },
        };

        let before = db::find_amendement(&tx, lecture_pk, record.key)?;
        let (amendement, created) = reconcile(&tx, lecture_pk, record, parent_pk)?;

        if created {
            outcome.created.insert(amendement.key());
        } else if before.map_or(false, |b| b.structural_hash != amendement.structural_hash) {
            outcome.updated += 1;
        } else {
            outcome.unchanged += 1;
        }
        reconciled.insert(amendement.key(), amendement.pk);
        amendements.insert(amendement.key(), amendement);
    }

    tx.commit()?;

    let mut amendements: Vec<Amendement> = amendements.into_values().collect();
    amendements.sort_by_key(|a| a.key());
    outcome.amendements = amendements;

    info!("{}: {}", lecture, outcome.summary());
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TexteRef;
    use crate::division::SubdivisionRef;
    use crate::models::{Chambre, Outcome, UserContent};
    use crate::sources::{
        Auteur, Identifiant, LiasseAmendement, Saisine, Signataires, TabularRow,
    };

    fn lecture_an() -> LectureRef {
        LectureRef {
            chambre: Chambre::An,
            session: "15".to_string(),
            texte: 806,
            organe: "PO717460".to_string(),
            partie: None,
        }
    }

    fn lecture_senat() -> LectureRef {
        LectureRef {
            chambre: Chambre::Senat,
            session: "2019-2020".to_string(),
            texte: 139,
            organe: "PO78718".to_string(),
            partie: None,
        }
    }

    fn ctx() -> ReferenceData {
        let mut ctx = ReferenceData::default();
        ctx.acteurs.insert("PA1".to_string(), "Jean Dupont".to_string());
        ctx.organes.insert("PO1".to_string(), "Groupe A".to_string());
        ctx.textes.insert(
            "PRJLANR5L15B0806".to_string(),
            TexteRef {
                chambre: Chambre::An,
                session: "15".to_string(),
                numero: 806,
                titre_long: Some("loi ESSOC".to_string()),
            },
        );
        ctx
    }

    fn uid(num: u32) -> String {
        format!("AMANR5L15PO717460B0806P0D1N{:06}", num)
    }

    fn liasse(num: u32, parent: Option<u32>) -> RawRecord {
        let mut item = LiasseAmendement {
            uid: uid(num),
            identifiant: Identifiant {
                numero: Some(num.to_string()),
                saisine: Saisine {
                    ref_texte_legislatif: Some("PRJLANR5L15B0806".to_string()),
                    organe_examen: Some("PO717460".to_string()),
                    numero_partie_plf: Some("0".to_string()),
                },
            },
            signataires: Signataires {
                auteur: Auteur {
                    type_auteur: Some("Député".to_string()),
                    acteur_ref: Some("PA1".to_string()),
                    groupe_politique_ref: Some("PO1".to_string()),
                },
            },
            amendement_parent: parent.map(uid),
            date_depot: Some("2019-01-15".to_string()),
            ..Default::default()
        };
        item.pointeur_fragment_texte.division.type_ = Some("ARTICLE".to_string());
        item.pointeur_fragment_texte.division.titre = Some("Article 3".to_string());
        RawRecord::Liasse(item)
    }

    fn tabular(numero: &str, subdivision: &str, sort: &str) -> RawRecord {
        RawRecord::Tabular(TabularRow {
            numero: numero.to_string(),
            subdivision: subdivision.to_string(),
            auteur: "M. DUPONT".to_string(),
            date_depot: "2019-11-21".to_string(),
            dispositif: "<body><p>Supprimer cet article.</p></body>".to_string(),
            sort: sort.to_string(),
            ..Default::default()
        })
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        conn
    }

    fn lecture_pk(conn: &Connection, lecture: &LectureRef) -> i64 {
        db::find_lecture(conn, lecture).unwrap().unwrap()
    }

    #[test]
    fn test_idempotent_reimport() {
        let mut conn = setup();
        let batch = Batch::new(
            SourceType::SenatCsv,
            vec![
                tabular("1", "Article 1er", ""),
                tabular("2", "Article 7 bis", "Adopté"),
                tabular("2 rect.", "Article 7 bis", ""),
            ],
        );

        let first = reconcile_batch(&mut conn, &ctx(), &lecture_senat(), &batch).unwrap();
        assert_eq!(first.created.len(), 3, "Revisions are distinct amendements");
        assert!(first.errors.is_empty());

        let pk = lecture_pk(&conn, &lecture_senat());
        let amdt = db::find_amendement(&conn, pk, AmendementKey::new(1, 0)).unwrap().unwrap();
        let content = UserContent {
            avis: Some("Défavorable".to_string()),
            reponse: Some("<p>Réponse</p>".to_string()),
            ..Default::default()
        };
        db::set_user_content(&conn, amdt.pk, &content).unwrap();
        let events_before = db::count_events(&conn, "amendement_updated").unwrap();

        let second = reconcile_batch(&mut conn, &ctx(), &lecture_senat(), &batch).unwrap();
        assert!(second.created.is_empty(), "Second import should create nothing");
        assert_eq!(second.unchanged, 3);
        assert_eq!(second.updated, 0);
        assert_eq!(second.amendements, first.amendements, "Same amendement set");
        assert_eq!(db::verify_count(&conn).unwrap(), 3);
        assert_eq!(db::get_user_content(&conn, amdt.pk).unwrap(), content);
        assert_eq!(
            db::count_events(&conn, "amendement_updated").unwrap(),
            events_before,
            "Identical re-import writes no event"
        );

        println!("✅ Idempotent re-import test PASSED");
    }

    #[test]
    fn test_structural_fields_are_overwritten_user_content_kept() {
        let mut conn = setup();
        let lecture = lecture_senat();
        reconcile_batch(
            &mut conn,
            &ctx(),
            &lecture,
            &Batch::new(SourceType::SenatCsv, vec![tabular("1", "Article 1", "")]),
        )
        .unwrap();
        let pk = lecture_pk(&conn, &lecture);
        let amdt = db::find_amendement(&conn, pk, AmendementKey::new(1, 0)).unwrap().unwrap();
        let content = UserContent {
            objet: Some("Suppression".to_string()),
            ..Default::default()
        };
        db::set_user_content(&conn, amdt.pk, &content).unwrap();

        let outcome = reconcile_batch(
            &mut conn,
            &ctx(),
            &lecture,
            &Batch::new(SourceType::SenatCsv, vec![tabular("1", "Article 2", "Rejeté")]),
        )
        .unwrap();
        assert_eq!(outcome.updated, 1);

        let updated = db::get_amendement(&conn, amdt.pk).unwrap().unwrap();
        assert_eq!(updated.fields.sort, Outcome::Rejected);
        assert_ne!(updated.fields.article_pk, amdt.fields.article_pk, "Moved to article 2");
        assert_eq!(db::get_user_content(&conn, amdt.pk).unwrap(), content);

        let events = db::get_events_for_entity(&conn, "amendement", &amdt.pk.to_string()).unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.event_type, "amendement_updated");
        assert_eq!(last.data["changed"], serde_json::json!(["article", "sort"]));
    }

    #[test]
    fn test_smaller_batch_preserves_missing_amendements() {
        let mut conn = setup();
        let lecture = lecture_senat();
        reconcile_batch(
            &mut conn,
            &ctx(),
            &lecture,
            &Batch::new(
                SourceType::SenatCsv,
                vec![tabular("1", "Article 1", ""), tabular("2", "Article 1", "")],
            ),
        )
        .unwrap();
        let pk = lecture_pk(&conn, &lecture);
        let amdt = db::find_amendement(&conn, pk, AmendementKey::new(2, 0)).unwrap().unwrap();
        let content = UserContent {
            avis: Some("Favorable".to_string()),
            ..Default::default()
        };
        db::set_user_content(&conn, amdt.pk, &content).unwrap();

        reconcile_batch(
            &mut conn,
            &ctx(),
            &lecture,
            &Batch::new(SourceType::SenatCsv, vec![tabular("1", "Article 1", "")]),
        )
        .unwrap();

        assert!(db::find_amendement(&conn, pk, AmendementKey::new(2, 0)).unwrap().is_some());
        assert_eq!(db::get_user_content(&conn, amdt.pk).unwrap(), content);
    }

    #[test]
    fn test_partial_failure_unknown_parent() {
        let mut conn = setup();
        let batch = Batch::new(
            SourceType::Liasse,
            vec![liasse(1, None), liasse(2, Some(999)), liasse(3, None)],
        );

        let outcome = reconcile_batch(&mut conn, &ctx(), &lecture_an(), &batch).unwrap();
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].0, uid(2));
        assert_eq!(outcome.errors[0].1, "Unknown parent amendement 999");
        assert_eq!(outcome.amendements.len(), 2, "Other records still produced");

        println!("✅ Partial failure test PASSED");
    }

    #[test]
    fn test_sous_amendement_parent_in_same_batch() {
        let mut conn = setup();
        let batch = Batch::new(
            SourceType::Liasse,
            vec![liasse(10, None), liasse(11, Some(10))],
        );
        let outcome = reconcile_batch(&mut conn, &ctx(), &lecture_an(), &batch).unwrap();
        assert!(outcome.errors.is_empty());

        let parent = &outcome.amendements[0];
        let child = &outcome.amendements[1];
        assert_eq!(child.fields.parent_pk, Some(parent.pk));
    }

    #[test]
    fn test_sous_amendement_declared_before_parent() {
        let mut conn = setup();
        let batch = Batch::new(
            SourceType::Liasse,
            vec![liasse(21, Some(20)), liasse(20, None)],
        );
        let outcome = reconcile_batch(&mut conn, &ctx(), &lecture_an(), &batch).unwrap();
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);

        let parent = outcome.amendements.iter().find(|a| a.num == 20).unwrap();
        let child = outcome.amendements.iter().find(|a| a.num == 21).unwrap();
        assert_eq!(child.fields.parent_pk, Some(parent.pk));
    }

    #[test]
    fn test_parent_from_previous_import() {
        let mut conn = setup();
        reconcile_batch(
            &mut conn,
            &ctx(),
            &lecture_an(),
            &Batch::new(SourceType::Liasse, vec![liasse(30, None)]),
        )
        .unwrap();

        let outcome = reconcile_batch(
            &mut conn,
            &ctx(),
            &lecture_an(),
            &Batch::new(SourceType::Liasse, vec![liasse(31, Some(30))]),
        )
        .unwrap();
        assert!(outcome.errors.is_empty());

        let pk = lecture_pk(&conn, &lecture_an());
        let parent = db::find_amendement(&conn, pk, AmendementKey::new(30, 0)).unwrap().unwrap();
        assert_eq!(outcome.amendements[0].fields.parent_pk, Some(parent.pk));
    }

    #[test]
    fn test_circular_parents_are_record_errors() {
        let mut conn = setup();
        let batch = Batch::new(
            SourceType::Liasse,
            vec![liasse(40, Some(41)), liasse(41, Some(40)), liasse(42, None)],
        );
        let outcome = reconcile_batch(&mut conn, &ctx(), &lecture_an(), &batch).unwrap();
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(outcome.amendements.len(), 1);
    }

    #[test]
    fn test_cross_reading_guard_rejects_whole_batch() {
        let mut conn = setup();
        let mut other = lecture_an();
        other.organe = "PO59048".to_string();

        let batch = Batch::new(SourceType::Liasse, vec![liasse(1, None), liasse(2, None)]);
        let err = reconcile_batch(&mut conn, &ctx(), &other, &batch).unwrap_err();

        assert!(matches!(err, BatchError::LectureMismatch { .. }));
        assert_eq!(db::verify_count(&conn).unwrap(), 0, "Nothing applied");
        assert!(db::find_lecture(&conn, &other).unwrap().is_none());

        println!("✅ Cross-reading guard test PASSED");
    }

    #[test]
    fn test_unknown_texte_only_fails_its_record() {
        let mut conn = setup();
        let mut other_texte = liasse(2, None);
        if let RawRecord::Liasse(item) = &mut other_texte {
            item.identifiant.saisine.ref_texte_legislatif = Some("PRJLANR5L15B9999".to_string());
        }
        let batch = Batch::new(
            SourceType::Liasse,
            vec![liasse(1, None), other_texte, liasse(3, None)],
        );

        let outcome = reconcile_batch(&mut conn, &ctx(), &lecture_an(), &batch).unwrap();
        assert_eq!(outcome.errors, vec![(uid(2), "Unknown texte PRJLANR5L15B9999".to_string())]);
        assert_eq!(outcome.amendements.len(), 2, "Other records still imported");
    }

    #[test]
    fn test_missing_organe_only_fails_its_record() {
        let mut conn = setup();
        let mut no_organe = liasse(5, None);
        if let RawRecord::Liasse(item) = &mut no_organe {
            item.identifiant.saisine.organe_examen = None;
        }
        let batch = Batch::new(SourceType::Liasse, vec![no_organe, liasse(6, None)]);

        let outcome = reconcile_batch(&mut conn, &ctx(), &lecture_an(), &batch).unwrap();
        assert_eq!(outcome.errors, vec![(uid(5), "Missing organeExamen".to_string())]);
        assert_eq!(outcome.amendements.len(), 1);
        assert_eq!(outcome.amendements[0].num, 6);
    }

    #[test]
    fn test_mismatch_is_fatal_even_after_record_errors() {
        let mut conn = setup();
        let mut no_organe = liasse(5, None);
        if let RawRecord::Liasse(item) = &mut no_organe {
            item.identifiant.saisine.organe_examen = None;
        }
        let mut other_organe = liasse(6, None);
        if let RawRecord::Liasse(item) = &mut other_organe {
            item.identifiant.saisine.organe_examen = Some("PO59048".to_string());
        }
        let batch = Batch::new(SourceType::Liasse, vec![no_organe, liasse(7, None), other_organe]);

        let err = reconcile_batch(&mut conn, &ctx(), &lecture_an(), &batch).unwrap_err();
        assert!(matches!(err, BatchError::LectureMismatch { .. }));
        assert_eq!(db::verify_count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_liasse_without_parent_clears_stored_parent() {
        let mut conn = setup();
        reconcile_batch(
            &mut conn,
            &ctx(),
            &lecture_an(),
            &Batch::new(SourceType::Liasse, vec![liasse(10, None), liasse(11, Some(10))]),
        )
        .unwrap();

        let outcome = reconcile_batch(
            &mut conn,
            &ctx(),
            &lecture_an(),
            &Batch::new(SourceType::Liasse, vec![liasse(10, None), liasse(11, None)]),
        )
        .unwrap();
        assert_eq!(outcome.updated, 1);

        let pk = lecture_pk(&conn, &lecture_an());
        let child = db::find_amendement(&conn, pk, AmendementKey::new(11, 0)).unwrap().unwrap();
        assert_eq!(child.fields.parent_pk, None, "Upstream dropped the parent link");

        let events = db::get_events_for_entity(&conn, "amendement", &child.pk.to_string()).unwrap();
        assert_eq!(events.last().unwrap().data["changed"], serde_json::json!(["parent"]));
    }

    #[test]
    fn test_texte_title_citation_targets_title() {
        let mut conn = setup();
        let mut on_title = liasse(8, None);
        if let RawRecord::Liasse(item) = &mut on_title {
            item.pointeur_fragment_texte.division.titre = Some("Loi ESSOC".to_string());
        }
        let outcome = reconcile_batch(
            &mut conn,
            &ctx(),
            &lecture_an(),
            &Batch::new(SourceType::Liasse, vec![on_title]),
        )
        .unwrap();
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);

        let pk = lecture_pk(&conn, &lecture_an());
        let articles = db::get_articles(&conn, pk).unwrap();
        assert_eq!(articles[0].subdivision, SubdivisionRef::title());
    }

    #[test]
    fn test_other_partie_rows_are_skipped() {
        let mut conn = setup();
        let mut lecture = lecture_senat();
        lecture.partie = Some(1);
        let batch = Batch::new(
            SourceType::SenatCsv,
            vec![tabular("I-1", "Article 1", ""), tabular("II-2", "Article 40", "")],
        );
        let outcome = reconcile_batch(&mut conn, &ctx(), &lecture, &batch).unwrap();
        assert_eq!(outcome.amendements.len(), 1);
        assert_eq!(outcome.amendements[0].num, 1);
    }

    #[test]
    fn test_invalid_numero_is_a_record_error() {
        let mut conn = setup();
        let batch = Batch::new(
            SourceType::SenatCsv,
            vec![tabular("12 rect. foo", "Article 1", ""), tabular("13", "Article 1", "")],
        );
        let outcome = reconcile_batch(&mut conn, &ctx(), &lecture_senat(), &batch).unwrap();
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].0, "12 rect. foo");
        assert_eq!(outcome.amendements.len(), 1);
    }

    #[test]
    fn test_discussion_batch_is_rejected() {
        let mut conn = setup();
        let batch = Batch::empty(SourceType::Derouleur);
        assert!(matches!(
            reconcile_batch(&mut conn, &ctx(), &lecture_senat(), &batch),
            Err(BatchError::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_article_created_on_first_reference() {
        let mut conn = setup();
        reconcile_batch(
            &mut conn,
            &ctx(),
            &lecture_senat(),
            &Batch::new(
                SourceType::SenatCsv,
                vec![tabular("1", "Article 7 bis", ""), tabular("2", "Article 7 bis", "")],
            ),
        )
        .unwrap();
        let pk = lecture_pk(&conn, &lecture_senat());
        let articles = db::get_articles(&conn, pk).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].subdivision, SubdivisionRef::article("7", "bis"));
    }

    #[test]
    fn test_number_from_uid() {
        assert_eq!(number_from_uid("AMANR5L15PO717460B0806P0D1N000012"), Some(12));
        assert_eq!(number_from_uid("foo"), None);
    }
}
