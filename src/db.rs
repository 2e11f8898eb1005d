use crate::division::{InsertPosition, SubdivisionKind, SubdivisionRef};
use crate::models::{
    Amendement, AmendementFields, AmendementKey, Article, Event, LectureRef, Outcome, UserContent,
};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Actor recorded on events written by the sync engine
pub const ACTOR: &str = "amendement_sync";

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Lectures (partie 0 = whole text, so the unique constraint holds)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS lectures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chambre TEXT NOT NULL,
            session TEXT NOT NULL,
            texte INTEGER NOT NULL,
            organe TEXT NOT NULL,
            partie INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (chambre, session, texte, organe, partie)
        )",
        [],
    )?;

    // ==========================================================================
    // Articles: natural key (lecture, kind, num, mult, pos)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS articles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lecture_id INTEGER NOT NULL REFERENCES lectures(id),
            kind TEXT NOT NULL,
            num TEXT NOT NULL,
            mult TEXT NOT NULL,
            pos TEXT NOT NULL,
            titre TEXT NOT NULL DEFAULT '',
            contenu TEXT NOT NULL DEFAULT '[]',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (lecture_id, kind, num, mult, pos)
        )",
        [],
    )?;

    // ==========================================================================
    // Amendements: natural key (lecture, num, rectif)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS amendements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lecture_id INTEGER NOT NULL REFERENCES lectures(id),
            num INTEGER NOT NULL,
            rectif INTEGER NOT NULL,
            article_id INTEGER REFERENCES articles(id),
            parent_id INTEGER REFERENCES amendements(id),
            alinea INTEGER,
            auteur TEXT NOT NULL DEFAULT '',
            matricule TEXT,
            groupe TEXT,
            date_depot TEXT,
            sort TEXT NOT NULL DEFAULT '',
            corps TEXT NOT NULL DEFAULT '',
            expose TEXT NOT NULL DEFAULT '',
            position INTEGER,
            discussion_group_id INTEGER,
            identical INTEGER,
            structural_hash TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (lecture_id, num, rectif)
        )",
        [],
    )?;

    // ==========================================================================
    // User content: written by humans, 1:1 with amendements
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_contents (
            amendement_id INTEGER PRIMARY KEY REFERENCES amendements(id),
            avis TEXT,
            objet TEXT,
            reponse TEXT,
            comments TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail / event sourcing)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_amendements_position ON amendements(lecture_id, position)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// LECTURES
// ============================================================================

pub fn find_lecture(conn: &Connection, lecture: &LectureRef) -> Result<Option<i64>> {
    let pk = conn
        .query_row(
            "SELECT id FROM lectures
             WHERE chambre = ?1 AND session = ?2 AND texte = ?3 AND organe = ?4 AND partie = ?5",
            params![
                lecture.chambre.code(),
                lecture.session,
                lecture.texte,
                lecture.organe,
                lecture.partie.unwrap_or(0),
            ],
            |row| row.get(0),
        )
        .optional()?;
    Ok(pk)
}

pub fn get_or_create_lecture(conn: &Connection, lecture: &LectureRef) -> Result<i64> {
    if let Some(pk) = find_lecture(conn, lecture)? {
        return Ok(pk);
    }
    conn.execute(
        "INSERT INTO lectures (chambre, session, texte, organe, partie) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            lecture.chambre.code(),
            lecture.session,
            lecture.texte,
            lecture.organe,
            lecture.partie.unwrap_or(0),
        ],
    )
    .with_context(|| format!("Failed to create lecture {}", lecture))?;
    Ok(conn.last_insert_rowid())
}

// ============================================================================
// ARTICLES
// ============================================================================

fn conversion_error(index: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    let kind: String = row.get(2)?;
    let pos: String = row.get(5)?;
    let contenu_json: String = row.get(7)?;
    Ok(Article {
        pk: row.get(0)?,
        lecture_pk: row.get(1)?,
        subdivision: SubdivisionRef {
            kind: SubdivisionKind::from_code(&kind).unwrap_or(SubdivisionKind::Error),
            number: row.get(3)?,
            multiplier: row.get(4)?,
            position: InsertPosition::from_code(&pos).unwrap_or_default(),
        },
        titre: row.get(6)?,
        contenu: serde_json::from_str(&contenu_json).map_err(|e| conversion_error(7, e))?,
    })
}

const ARTICLE_COLUMNS: &str = "id, lecture_id, kind, num, mult, pos, titre, contenu";

pub fn find_article(
    conn: &Connection,
    lecture_pk: i64,
    subdivision: &SubdivisionRef,
) -> Result<Option<Article>> {
    let article = conn
        .query_row(
            &format!(
                "SELECT {} FROM articles
                 WHERE lecture_id = ?1 AND kind = ?2 AND num = ?3 AND mult = ?4 AND pos = ?5",
                ARTICLE_COLUMNS
            ),
            params![
                lecture_pk,
                subdivision.kind.code(),
                subdivision.number,
                subdivision.multiplier,
                subdivision.position.code(),
            ],
            article_from_row,
        )
        .optional()?;
    Ok(article)
}

/// Find the Article with this natural key, creating it on first reference.
///
/// Returns the article and whether it was created.
pub fn find_or_create_article(
    conn: &Connection,
    lecture_pk: i64,
    subdivision: &SubdivisionRef,
) -> Result<(Article, bool)> {
    if let Some(article) = find_article(conn, lecture_pk, subdivision)? {
        return Ok((article, false));
    }

    conn.execute(
        "INSERT INTO articles (lecture_id, kind, num, mult, pos) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            lecture_pk,
            subdivision.kind.code(),
            subdivision.number,
            subdivision.multiplier,
            subdivision.position.code(),
        ],
    )?;
    let pk = conn.last_insert_rowid();

    let event = Event::new(
        "article_created",
        "article",
        &pk.to_string(),
        serde_json::json!({
            "lecture": lecture_pk,
            "subdivision": subdivision.to_string(),
        }),
        ACTOR,
    );
    insert_event(conn, &event)?;

    let article = Article {
        pk,
        lecture_pk,
        subdivision: subdivision.clone(),
        titre: String::new(),
        contenu: Vec::new(),
    };
    Ok((article, true))
}

pub fn get_articles(conn: &Connection, lecture_pk: i64) -> Result<Vec<Article>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM articles WHERE lecture_id = ?1 ORDER BY id",
        ARTICLE_COLUMNS
    ))?;

    let articles = stmt
        .query_map([lecture_pk], article_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(articles)
}

pub fn update_article_contents(conn: &Connection, article_pk: i64, contenu: &[String]) -> Result<()> {
    let contenu_json = serde_json::to_string(contenu)?;
    conn.execute(
        "UPDATE articles SET contenu = ?1 WHERE id = ?2",
        params![contenu_json, article_pk],
    )?;
    Ok(())
}

pub fn set_article_title(conn: &Connection, article_pk: i64, titre: &str) -> Result<()> {
    conn.execute(
        "UPDATE articles SET titre = ?1 WHERE id = ?2",
        params![titre, article_pk],
    )?;
    Ok(())
}

// ============================================================================
// AMENDEMENTS
// ============================================================================

const AMENDEMENT_COLUMNS: &str = "id, lecture_id, num, rectif, article_id, parent_id, alinea,
    auteur, matricule, groupe, date_depot, sort, corps, expose,
    position, discussion_group_id, identical, structural_hash";

const DATE_FORMAT: &str = "%Y-%m-%d";

fn amendement_from_row(row: &Row) -> rusqlite::Result<Amendement> {
    let date_depot: Option<String> = row.get(10)?;
    let date_depot = date_depot
        .map(|text| NaiveDate::parse_from_str(&text, DATE_FORMAT))
        .transpose()
        .map_err(|e| conversion_error(10, e))?;
    let sort: String = row.get(11)?;

    Ok(Amendement {
        pk: row.get(0)?,
        lecture_pk: row.get(1)?,
        num: row.get(2)?,
        rectif: row.get(3)?,
        fields: AmendementFields {
            article_pk: row.get(4)?,
            parent_pk: row.get(5)?,
            alinea: row.get(6)?,
            auteur: row.get(7)?,
            matricule: row.get(8)?,
            groupe: row.get(9)?,
            date_depot,
            sort: Outcome::from_text(&sort),
            corps: row.get(12)?,
            expose: row.get(13)?,
        },
        position: row.get(14)?,
        discussion_group_id: row.get(15)?,
        identical: row.get(16)?,
        structural_hash: row.get(17)?,
    })
}

pub fn get_amendement(conn: &Connection, pk: i64) -> Result<Option<Amendement>> {
    let amendement = conn
        .query_row(
            &format!("SELECT {} FROM amendements WHERE id = ?1", AMENDEMENT_COLUMNS),
            [pk],
            amendement_from_row,
        )
        .optional()?;
    Ok(amendement)
}

pub fn find_amendement(
    conn: &Connection,
    lecture_pk: i64,
    key: AmendementKey,
) -> Result<Option<Amendement>> {
    let amendement = conn
        .query_row(
            &format!(
                "SELECT {} FROM amendements WHERE lecture_id = ?1 AND num = ?2 AND rectif = ?3",
                AMENDEMENT_COLUMNS
            ),
            params![lecture_pk, key.num, key.rectif],
            amendement_from_row,
        )
        .optional()?;
    Ok(amendement)
}

/// Highest revision stored for an amendement number
pub fn find_latest_revision(
    conn: &Connection,
    lecture_pk: i64,
    num: u32,
) -> Result<Option<Amendement>> {
    let amendement = conn
        .query_row(
            &format!(
                "SELECT {} FROM amendements WHERE lecture_id = ?1 AND num = ?2
                 ORDER BY rectif DESC LIMIT 1",
                AMENDEMENT_COLUMNS
            ),
            params![lecture_pk, num],
            amendement_from_row,
        )
        .optional()?;
    Ok(amendement)
}

pub fn insert_amendement(
    conn: &Connection,
    lecture_pk: i64,
    key: AmendementKey,
    fields: &AmendementFields,
) -> Result<Amendement> {
    let hash = fields.structural_hash();
    conn.execute(
        "INSERT INTO amendements (
            lecture_id, num, rectif, article_id, parent_id, alinea, auteur, matricule,
            groupe, date_depot, sort, corps, expose, structural_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            lecture_pk,
            key.num,
            key.rectif,
            fields.article_pk,
            fields.parent_pk,
            fields.alinea,
            fields.auteur,
            fields.matricule,
            fields.groupe,
            fields.date_depot.map(|d| d.format(DATE_FORMAT).to_string()),
            fields.sort.code(),
            fields.corps,
            fields.expose,
            hash,
        ],
    )
    .with_context(|| format!("Failed to insert amendement {}", key))?;

    Ok(Amendement {
        pk: conn.last_insert_rowid(),
        lecture_pk,
        num: key.num,
        rectif: key.rectif,
        fields: fields.clone(),
        position: None,
        discussion_group_id: None,
        identical: None,
        structural_hash: hash,
    })
}

/// Overwrite every structural field (upstream is authoritative)
pub fn update_structural(conn: &Connection, amendement_pk: i64, fields: &AmendementFields) -> Result<()> {
    conn.execute(
        "UPDATE amendements SET
            article_id = ?1, parent_id = ?2, alinea = ?3, auteur = ?4, matricule = ?5,
            groupe = ?6, date_depot = ?7, sort = ?8, corps = ?9, expose = ?10,
            structural_hash = ?11, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?12",
        params![
            fields.article_pk,
            fields.parent_pk,
            fields.alinea,
            fields.auteur,
            fields.matricule,
            fields.groupe,
            fields.date_depot.map(|d| d.format(DATE_FORMAT).to_string()),
            fields.sort.code(),
            fields.corps,
            fields.expose,
            fields.structural_hash(),
            amendement_pk,
        ],
    )?;
    Ok(())
}

/// Discussion-order fields, as delivered by the discussion feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscussionDetails {
    pub position: u32,
    pub discussion_group_id: Option<i64>,
    pub identical: Option<bool>,
}

pub fn set_discussion_details(
    conn: &Connection,
    amendement_pk: i64,
    details: &DiscussionDetails,
) -> Result<()> {
    conn.execute(
        "UPDATE amendements SET
            position = ?1, discussion_group_id = ?2, identical = ?3,
            updated_at = CURRENT_TIMESTAMP
         WHERE id = ?4",
        params![
            details.position,
            details.discussion_group_id,
            details.identical,
            amendement_pk,
        ],
    )?;
    Ok(())
}

pub fn clear_position(conn: &Connection, amendement_pk: i64) -> Result<()> {
    conn.execute(
        "UPDATE amendements SET position = NULL, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
        [amendement_pk],
    )?;
    Ok(())
}

pub fn get_amendements(conn: &Connection, lecture_pk: i64) -> Result<Vec<Amendement>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM amendements WHERE lecture_id = ?1 ORDER BY num, rectif",
        AMENDEMENT_COLUMNS
    ))?;

    let amendements = stmt
        .query_map([lecture_pk], amendement_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(amendements)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM amendements", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// USER CONTENT
// ============================================================================

pub fn get_user_content(conn: &Connection, amendement_pk: i64) -> Result<UserContent> {
    let content = conn
        .query_row(
            "SELECT avis, objet, reponse, comments FROM user_contents WHERE amendement_id = ?1",
            [amendement_pk],
            |row| {
                Ok(UserContent {
                    avis: row.get(0)?,
                    objet: row.get(1)?,
                    reponse: row.get(2)?,
                    comments: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(content.unwrap_or_default())
}

/// Written by the editing layer; the sync engine never calls this.
pub fn set_user_content(conn: &Connection, amendement_pk: i64, content: &UserContent) -> Result<()> {
    conn.execute(
        "INSERT INTO user_contents (amendement_id, avis, objet, reponse, comments)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(amendement_id) DO UPDATE SET
            avis = excluded.avis, objet = excluded.objet,
            reponse = excluded.reponse, comments = excluded.comments",
        params![
            amendement_pk,
            content.avis,
            content.objet,
            content.reponse,
            content.comments,
        ],
    )?;
    Ok(())
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| conversion_error(1, e))?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

pub fn count_events(conn: &Connection, event_type: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE event_type = ?1",
        [event_type],
        |row| row.get(0),
    )?;
    Ok(count)
}
