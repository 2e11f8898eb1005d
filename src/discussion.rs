// 🗂️ Discussion-Order Enricher - position, joint discussion, identical, parent
//
// Dérouleur documents (in order)
//   → DiscussionFeed   (pass 1: every idAmendement → number, pass 2: entries)
//   → enrich_with_discussion_order
//        listed amendements: position / group / identical / parent
//        positioned amendements no longer listed: position retracted

use crate::db::{self, DiscussionDetails, ACTOR};
use crate::error::{BatchError, RecordError};
use crate::models::{Amendement, AmendementFields, AmendementKey, Event, LectureRef};
use crate::multiplier::parse_numero;
use crate::sources::{load_source, parse_bool, Batch, DiscussionRow, RawRecord, SourceType};
use anyhow::Result;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

// ============================================================================
// FEED
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscussionEntry {
    /// Upstream idAmendement
    pub id: String,
    pub key: AmendementKey,
    /// 1-based rank across the whole feed
    pub position: u32,
    pub discussion_group_id: Option<i64>,
    pub identical: bool,
    pub parent: Option<AmendementKey>,
}

#[derive(Debug, Clone, Default)]
pub struct DiscussionFeed {
    pub entries: Vec<DiscussionEntry>,
    /// (identity, cause) for rows that could not be read
    pub errors: Vec<(String, String)>,
}

impl DiscussionFeed {
    /// Build a feed from dérouleur batches, in the order given.
    ///
    /// Positions run continuously across documents, counting every row.
    pub fn from_batches(batches: &[Batch]) -> Self {
        let mut feed = DiscussionFeed::default();

        let mut rows: Vec<&DiscussionRow> = Vec::new();
        for batch in batches {
            if batch.source != SourceType::Derouleur {
                warn!("Ignoring {} batch in discussion feed", batch.source.name());
                continue;
            }
            feed.errors.extend(batch.errors.iter().cloned());
            rows.extend(batch.records.iter().filter_map(|record| match record {
                RawRecord::Discussion(row) => Some(row),
                _ => None,
            }));
        }

        // Pass 1: identities, so parents listed after their children still resolve
        let mut uid_map: HashMap<&str, AmendementKey> = HashMap::new();
        let mut keys: Vec<Option<AmendementKey>> = Vec::with_capacity(rows.len());
        for row in &rows {
            match parse_numero(&row.num) {
                Ok((num, rectif)) => {
                    let key = AmendementKey::new(num, rectif);
                    uid_map.insert(row.id_amendement.as_str(), key);
                    keys.push(Some(key));
                }
                Err(err) => {
                    warn!("Discussion entry {}: {}", row.id_amendement, err);
                    feed.errors.push((row.id_amendement.clone(), err.to_string()));
                    keys.push(None);
                }
            }
        }

        // Pass 2
        for (index, (row, key)) in rows.iter().zip(keys).enumerate() {
            let Some(key) = key else { continue };
            let position = (index + 1) as u32;

            match discussion_entry(row, key, position, &uid_map) {
                Ok((entry, parent_error)) => {
                    if let Some(err) = parent_error {
                        warn!("{}", err);
                        feed.errors.push((row.id_amendement.clone(), err.to_string()));
                    }
                    feed.entries.push(entry);
                }
                Err(err) => {
                    warn!("Discussion entry {}: {}", row.id_amendement, err);
                    feed.errors.push((row.id_amendement.clone(), err.to_string()));
                }
            }
        }

        feed
    }

    /// Load and merge dérouleur files. Missing files contribute nothing.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        let mut batches = Vec::with_capacity(paths.len());
        for path in paths {
            let batch = load_source(path)?;
            if batch.source != SourceType::Derouleur {
                anyhow::bail!("Not a discussion feed: {}", path.display());
            }
            batches.push(batch);
        }
        Ok(Self::from_batches(&batches))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.errors.is_empty()
    }
}

/// One feed row. An unknown parent does not drop the row: it is reported alongside.
fn discussion_entry(
    row: &DiscussionRow,
    key: AmendementKey,
    position: u32,
    uid_map: &HashMap<&str, AmendementKey>,
) -> Result<(DiscussionEntry, Option<RecordError>), RecordError> {
    let discussion_group_id = if parse_bool(&row.is_discussion_commune)? {
        row.id_discussion_commune
            .as_deref()
            .map(|id| {
                id.trim()
                    .parse::<i64>()
                    .map_err(|_| RecordError::InvalidNumero(id.to_string()))
            })
            .transpose()?
    } else {
        None
    };

    let identical = parse_bool(&row.is_identique)?;

    let is_sous_amendement = match row.is_sous_amendement.as_deref() {
        Some(flag) => parse_bool(flag)?,
        None => false,
    };

    let mut parent = None;
    let mut parent_error = None;
    if is_sous_amendement {
        let pere = row.id_amendement_pere.as_deref().unwrap_or("");
        match uid_map.get(pere) {
            Some(parent_key) => parent = Some(*parent_key),
            None => parent_error = Some(RecordError::UnknownParent(pere.to_string())),
        }
    }

    Ok((
        DiscussionEntry {
            id: row.id_amendement.clone(),
            key,
            position,
            discussion_group_id,
            identical,
            parent,
        },
        parent_error,
    ))
}

// ============================================================================
// ENRICHMENT
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DiscussionOutcome {
    pub positioned: usize,
    /// Amendements that left the discussion
    pub retracted: Vec<AmendementKey>,
    /// Feed entries with no stored amendement
    pub missing: Vec<AmendementKey>,
    pub errors: Vec<(String, String)>,
}

impl DiscussionOutcome {
    pub fn summary(&self) -> String {
        format!(
            "{} positioned, {} retracted, {} missing, {} errors",
            self.positioned,
            self.retracted.len(),
            self.missing.len(),
            self.errors.len()
        )
    }
}

/// Stored amendements of a lecture, looked up by exact key or by number
struct AmendementIndex<'a> {
    by_key: HashMap<AmendementKey, &'a Amendement>,
    latest: HashMap<u32, &'a Amendement>,
}

impl<'a> AmendementIndex<'a> {
    fn new(amendements: &'a [Amendement]) -> Self {
        let mut by_key = HashMap::new();
        let mut latest: HashMap<u32, &Amendement> = HashMap::new();
        for amendement in amendements {
            by_key.insert(amendement.key(), amendement);
            let entry = latest.entry(amendement.num).or_insert(amendement);
            if amendement.rectif > entry.rectif {
                *entry = amendement;
            }
        }
        AmendementIndex { by_key, latest }
    }

    /// The feed may still list a number after a revision was published
    fn get(&self, key: AmendementKey) -> Option<&'a Amendement> {
        self.by_key
            .get(&key)
            .or_else(|| self.latest.get(&key.num))
            .copied()
    }
}

/// Apply a discussion feed to the stored amendements of a lecture.
///
/// An empty feed (upstream not found) leaves every position in place.
pub fn enrich_with_discussion_order(
    conn: &mut Connection,
    lecture: &LectureRef,
    feed: &DiscussionFeed,
) -> Result<DiscussionOutcome, BatchError> {
    let mut outcome = DiscussionOutcome {
        errors: feed.errors.clone(),
        ..Default::default()
    };

    if feed.is_empty() {
        info!("No discussion order for {}, positions left as they are", lecture);
        return Ok(outcome);
    }

    let tx = conn.transaction()?;
    let Some(lecture_pk) = db::find_lecture(&tx, lecture)? else {
        warn!("No amendements stored for {}", lecture);
        return Ok(outcome);
    };

    let amendements = db::get_amendements(&tx, lecture_pk)?;
    let index = AmendementIndex::new(&amendements);
    let mut seen: HashSet<i64> = HashSet::new();

    for entry in &feed.entries {
        let Some(amendement) = index.get(entry.key) else {
            warn!("Amendement {} from the discussion feed is unknown", entry.key);
            outcome.missing.push(entry.key);
            continue;
        };
        seen.insert(amendement.pk);

        // The feed is authoritative for parentage: no parent listed clears it
        let parent_pk = match entry.parent {
            None => None,
            Some(parent_key) => match index.get(parent_key) {
                Some(parent) => Some(parent.pk),
                None => {
                    warn!("Unknown parent amendement {}", parent_key);
                    None
                }
            },
        };

        let details = DiscussionDetails {
            position: entry.position,
            discussion_group_id: entry.discussion_group_id,
            identical: Some(entry.identical),
        };

        let parent_changed = parent_pk != amendement.fields.parent_pk;
        let changed = parent_changed
            || amendement.position != Some(details.position)
            || amendement.discussion_group_id != details.discussion_group_id
            || amendement.identical != details.identical;

        if parent_changed {
            let fields = AmendementFields {
                parent_pk,
                ..amendement.fields.clone()
            };
            db::update_structural(&tx, amendement.pk, &fields)?;
        }
        db::set_discussion_details(&tx, amendement.pk, &details)?;
        outcome.positioned += 1;

        if changed {
            let event = Event::new(
                "discussion_updated",
                "amendement",
                &amendement.pk.to_string(),
                serde_json::json!({
                    "num": amendement.num_disp(),
                    "position": details.position,
                    "discussion_group_id": details.discussion_group_id,
                    "identical": details.identical,
                    "parent": parent_pk,
                }),
                ACTOR,
            );
            db::insert_event(&tx, &event)?;
        } else {
            debug!("Amendement {}: discussion order unchanged", amendement.num_disp());
        }
    }

    for amendement in &amendements {
        if amendement.position.is_none() || seen.contains(&amendement.pk) {
            continue;
        }
        db::clear_position(&tx, amendement.pk)?;
        info!("Amendement {} retiré de la discussion", amendement.num_disp());

        let event = Event::new(
            "amendement_retire_discussion",
            "amendement",
            &amendement.pk.to_string(),
            serde_json::json!({
                "num": amendement.num_disp(),
                "previous_position": amendement.position,
            }),
            ACTOR,
        );
        db::insert_event(&tx, &event)?;
        outcome.retracted.push(amendement.key());
    }

    tx.commit()?;

    info!("{}: {}", lecture, outcome.summary());
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ReferenceData;
    use crate::models::{Chambre, UserContent};
    use crate::reconcile::reconcile_batch;
    use crate::sources::TabularRow;
    use std::io::Write;

    fn lecture() -> LectureRef {
        LectureRef {
            chambre: Chambre::Senat,
            session: "2019-2020".to_string(),
            texte: 139,
            organe: "PO78718".to_string(),
            partie: None,
        }
    }

    fn row(id: &str, num: &str) -> DiscussionRow {
        DiscussionRow {
            id_amendement: id.to_string(),
            num: num.to_string(),
            is_discussion_commune: "false".to_string(),
            is_identique: "false".to_string(),
            ..Default::default()
        }
    }

    fn sous_amendement(id: &str, num: &str, pere: &str) -> DiscussionRow {
        DiscussionRow {
            is_sous_amendement: Some("true".to_string()),
            id_amendement_pere: Some(pere.to_string()),
            ..row(id, num)
        }
    }

    fn batch(rows: Vec<DiscussionRow>) -> Batch {
        Batch::new(
            SourceType::Derouleur,
            rows.into_iter().map(RawRecord::Discussion).collect(),
        )
    }

    fn setup(keys: &[(u32, u32)]) -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        let lecture_pk = db::get_or_create_lecture(&conn, &lecture()).unwrap();
        for (num, rectif) in keys {
            db::insert_amendement(
                &conn,
                lecture_pk,
                AmendementKey::new(*num, *rectif),
                &AmendementFields::default(),
            )
            .unwrap();
        }
        (conn, lecture_pk)
    }

    fn get(conn: &Connection, lecture_pk: i64, num: u32, rectif: u32) -> Amendement {
        db::find_amendement(conn, lecture_pk, AmendementKey::new(num, rectif))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_positions_run_across_documents() {
        let feed = DiscussionFeed::from_batches(&[
            batch(vec![row("a", "3"), row("b", "1")]),
            batch(vec![row("c", "2 rect.")]),
        ]);
        assert!(feed.errors.is_empty());
        let positions: Vec<(AmendementKey, u32)> =
            feed.entries.iter().map(|e| (e.key, e.position)).collect();
        assert_eq!(
            positions,
            vec![
                (AmendementKey::new(3, 0), 1),
                (AmendementKey::new(1, 0), 2),
                (AmendementKey::new(2, 1), 3),
            ]
        );
    }

    #[test]
    fn test_enrich_sets_position_group_and_identical() {
        let (mut conn, lecture_pk) = setup(&[(1, 0), (2, 0), (3, 0)]);
        let mut commune = row("b", "2");
        commune.is_discussion_commune = "true".to_string();
        commune.id_discussion_commune = Some("110541".to_string());
        commune.is_identique = "true".to_string();
        commune.id_identique = Some("42".to_string());

        let feed = DiscussionFeed::from_batches(&[batch(vec![row("c", "3"), commune])]);
        let outcome = enrich_with_discussion_order(&mut conn, &lecture(), &feed).unwrap();
        assert_eq!(outcome.positioned, 2);

        let third = get(&conn, lecture_pk, 3, 0);
        assert_eq!(third.position, Some(1));
        assert_eq!(third.discussion_group_id, None);
        assert_eq!(third.identical, Some(false));

        let second = get(&conn, lecture_pk, 2, 0);
        assert_eq!(second.position, Some(2));
        assert_eq!(second.discussion_group_id, Some(110541));
        assert_eq!(second.identical, Some(true));

        assert_eq!(get(&conn, lecture_pk, 1, 0).position, None);

        println!("✅ Discussion enrichment test PASSED");
    }

    #[test]
    fn test_sous_amendement_parent_declared_before_or_after() {
        let (mut conn, lecture_pk) = setup(&[(10, 0), (11, 0), (12, 0), (13, 0)]);
        let feed = DiscussionFeed::from_batches(&[batch(vec![
            row("p", "10"),
            sous_amendement("s1", "11", "p"),
            sous_amendement("s2", "12", "q"),
            row("q", "13"),
        ])]);
        // "q" is listed after its sous-amendement and still resolves
        assert!(feed.errors.is_empty(), "{:?}", feed.errors);

        enrich_with_discussion_order(&mut conn, &lecture(), &feed).unwrap();
        let parent = get(&conn, lecture_pk, 10, 0);
        let child = get(&conn, lecture_pk, 11, 0);
        assert_eq!(child.fields.parent_pk, Some(parent.pk));
        assert_eq!(
            child.structural_hash,
            child.fields.structural_hash(),
            "Hash follows the parent change"
        );

        let late_parent = get(&conn, lecture_pk, 13, 0);
        assert_eq!(get(&conn, lecture_pk, 12, 0).fields.parent_pk, Some(late_parent.pk));
    }

    #[test]
    fn test_feed_without_parent_clears_stale_parent() {
        let (mut conn, lecture_pk) = setup(&[(10, 0), (11, 0)]);
        let with_parent = DiscussionFeed::from_batches(&[batch(vec![
            row("p", "10"),
            sous_amendement("s", "11", "p"),
        ])]);
        enrich_with_discussion_order(&mut conn, &lecture(), &with_parent).unwrap();
        assert!(get(&conn, lecture_pk, 11, 0).fields.parent_pk.is_some());

        let without_parent =
            DiscussionFeed::from_batches(&[batch(vec![row("p", "10"), row("s", "11")])]);
        enrich_with_discussion_order(&mut conn, &lecture(), &without_parent).unwrap();

        let child = get(&conn, lecture_pk, 11, 0);
        assert_eq!(child.fields.parent_pk, None);
        assert_eq!(child.structural_hash, child.fields.structural_hash());
        assert_eq!(db::count_events(&conn, "discussion_updated").unwrap(), 3);
    }

    #[test]
    fn test_unknown_parent_is_reported_but_entry_kept() {
        let feed = DiscussionFeed::from_batches(&[batch(vec![sous_amendement("s", "5", "zzz")])]);
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].parent, None);
        assert_eq!(feed.errors.len(), 1);
        assert_eq!(feed.errors[0].1, "Unknown parent amendement zzz");
    }

    #[test]
    fn test_invalid_flags_are_row_errors() {
        let mut bad = row("x", "7");
        bad.is_identique = "oui".to_string();
        let bad_num = row("y", "abc");

        let feed = DiscussionFeed::from_batches(&[batch(vec![bad, bad_num, row("z", "8")])]);
        assert_eq!(feed.errors.len(), 2);
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].position, 3, "Positions follow the feed");
    }

    #[test]
    fn test_retraction_of_amendements_leaving_discussion() {
        let (mut conn, lecture_pk) = setup(&[(1, 0), (2, 0)]);
        let first = DiscussionFeed::from_batches(&[batch(vec![row("a", "1"), row("b", "2")])]);
        enrich_with_discussion_order(&mut conn, &lecture(), &first).unwrap();

        let withdrawn = get(&conn, lecture_pk, 2, 0);
        let content = UserContent {
            avis: Some("Favorable".to_string()),
            ..Default::default()
        };
        db::set_user_content(&conn, withdrawn.pk, &content).unwrap();

        let second = DiscussionFeed::from_batches(&[batch(vec![row("a", "1")])]);
        let outcome = enrich_with_discussion_order(&mut conn, &lecture(), &second).unwrap();

        assert_eq!(outcome.retracted, vec![AmendementKey::new(2, 0)]);
        assert_eq!(get(&conn, lecture_pk, 2, 0).position, None);
        assert_eq!(get(&conn, lecture_pk, 1, 0).position, Some(1));
        assert_eq!(db::get_user_content(&conn, withdrawn.pk).unwrap(), content);
        assert_eq!(db::count_events(&conn, "amendement_retire_discussion").unwrap(), 1);

        println!("✅ Discussion retraction test PASSED");
    }

    #[test]
    fn test_empty_feed_keeps_positions() {
        let (mut conn, lecture_pk) = setup(&[(1, 0)]);
        let feed = DiscussionFeed::from_batches(&[batch(vec![row("a", "1")])]);
        enrich_with_discussion_order(&mut conn, &lecture(), &feed).unwrap();

        let outcome =
            enrich_with_discussion_order(&mut conn, &lecture(), &DiscussionFeed::default()).unwrap();
        assert!(outcome.retracted.is_empty());
        assert_eq!(get(&conn, lecture_pk, 1, 0).position, Some(1));
    }

    #[test]
    fn test_feed_number_falls_back_to_latest_revision() {
        let (mut conn, lecture_pk) = setup(&[(4, 1), (4, 2)]);
        let feed = DiscussionFeed::from_batches(&[batch(vec![row("a", "4")])]);
        let outcome = enrich_with_discussion_order(&mut conn, &lecture(), &feed).unwrap();

        assert!(outcome.missing.is_empty());
        assert_eq!(get(&conn, lecture_pk, 4, 2).position, Some(1));
        assert_eq!(get(&conn, lecture_pk, 4, 1).position, None);
    }

    #[test]
    fn test_unknown_amendement_is_missing() {
        let (mut conn, _) = setup(&[(1, 0)]);
        let feed = DiscussionFeed::from_batches(&[batch(vec![row("a", "99")])]);
        let outcome = enrich_with_discussion_order(&mut conn, &lecture(), &feed).unwrap();
        assert_eq!(outcome.missing, vec![AmendementKey::new(99, 0)]);
    }

    #[test]
    fn test_identical_feed_writes_no_new_event() {
        let (mut conn, _) = setup(&[(1, 0)]);
        let feed = DiscussionFeed::from_batches(&[batch(vec![row("a", "1")])]);
        enrich_with_discussion_order(&mut conn, &lecture(), &feed).unwrap();
        enrich_with_discussion_order(&mut conn, &lecture(), &feed).unwrap();
        assert_eq!(db::count_events(&conn, "discussion_updated").unwrap(), 1);
    }

    #[test]
    fn test_parent_survives_tabular_reimport() {
        let (mut conn, lecture_pk) = setup(&[]);
        let tabular = |numero: &str| {
            RawRecord::Tabular(TabularRow {
                numero: numero.to_string(),
                subdivision: "Article 1".to_string(),
                auteur: "M. X".to_string(),
                ..Default::default()
            })
        };
        let csv = Batch::new(SourceType::SenatCsv, vec![tabular("1"), tabular("2")]);
        let ctx = ReferenceData::default();
        reconcile_batch(&mut conn, &ctx, &lecture(), &csv).unwrap();

        let feed = DiscussionFeed::from_batches(&[batch(vec![
            row("a", "1"),
            sous_amendement("b", "2", "a"),
        ])]);
        enrich_with_discussion_order(&mut conn, &lecture(), &feed).unwrap();

        let outcome = reconcile_batch(&mut conn, &ctx, &lecture(), &csv).unwrap();
        assert_eq!(outcome.unchanged, 2, "Discussion parent is not a structural change");
        let parent = get(&conn, lecture_pk, 1, 0);
        assert_eq!(get(&conn, lecture_pk, 2, 0).fields.parent_pk, Some(parent.pk));
    }

    #[test]
    fn test_load_feed_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("liste_discussion_1.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            br#"{"Subdivisions": [{"Amendements": [
                {"idAmendement": "1", "num": "1", "isDiscussionCommune": "false", "isIdentique": "false"}
            ]}]}"#,
        )
        .unwrap();
        let missing = dir.path().join("liste_discussion_2.json");

        let feed = DiscussionFeed::load(&[path, missing]).unwrap();
        assert_eq!(feed.entries.len(), 1);

        assert!(DiscussionFeed::load(&[dir.path().join("liasse.json")]).is_err());
    }
}
