// 📜 Text-Body Enrichment - articles from the text of the lecture
//
// Items (articles, annexes, sections) in text order
//   → Articles created lazily (ranges expanded: "19 à 24" → 6 articles)
//   → machine content overwritten when it differs
//   → editorial title filled only when still empty

use crate::db::{self, ACTOR};
use crate::division::{InsertPosition, SubdivisionKind, SubdivisionRef};
use crate::error::BatchError;
use crate::models::{Article, Event, LectureRef};
use crate::multiplier::{expand_range, parse_article_title};
use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// One item of a parsed text body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBodyItem {
    /// "article", "annexe", "section", "texte", "dots"
    #[serde(rename = "type")]
    pub kind: String,

    /// Citation text: "1er", "7 bis", "19 à 24", or a section title
    #[serde(default)]
    pub titre: Option<String>,

    #[serde(default)]
    pub id: Option<String>,

    /// Id of the enclosing section
    #[serde(default)]
    pub section: Option<String>,

    #[serde(default, alias = "alineas")]
    pub paragraphs: Option<Vec<String>>,

    /// Whether `titre` may cover several articles
    #[serde(default = "default_range_aware")]
    pub range_aware: bool,
}

fn default_range_aware() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticlesOutcome {
    pub created: usize,
    pub content_updated: usize,
    pub titles_set: usize,
}

impl ArticlesOutcome {
    pub fn changed(&self) -> bool {
        self.created + self.content_updated + self.titles_set > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} articles created, {} contents updated, {} titles set",
            self.created, self.content_updated, self.titles_set
        )
    }
}

/// Read a text body (JSON array of items). A missing file means no text yet.
pub fn load_text_body(path: &Path) -> Result<Vec<TextBodyItem>> {
    if !path.exists() {
        warn!("Texte non trouvé : {}", path.display());
        return Ok(Vec::new());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse text body {}", path.display()))
}

/// Subdivisions an item stands for
fn item_subdivisions(index: usize, item: &TextBodyItem) -> Result<Vec<SubdivisionRef>, BatchError> {
    match item.kind.as_str() {
        "texte" | "section" | "dots" => Ok(Vec::new()),
        // Numbered by position so several annexes never collide
        "annexe" => Ok(vec![SubdivisionRef::new(
            SubdivisionKind::Annex,
            index.to_string(),
            "",
            InsertPosition::None,
        )]),
        _ => {
            let Some(titre) = item.titre.as_deref() else {
                return Ok(Vec::new());
            };
            if item.range_aware {
                Ok(expand_range(titre)?)
            } else {
                Ok(vec![parse_article_title(titre)?])
            }
        }
    }
}

/// Title of the section enclosing an item, if any
fn section_title<'a>(items: &'a [TextBodyItem], item: &TextBodyItem) -> Option<&'a str> {
    let section = item.section.as_deref()?;
    items
        .iter()
        .find(|other| other.id.as_deref() == Some(section))
        .and_then(|other| other.titre.as_deref())
}

fn update_article_contents(conn: &Connection, article: &Article, item: &TextBodyItem) -> Result<bool> {
    let Some(paragraphs) = &item.paragraphs else {
        return Ok(false);
    };
    if *paragraphs == article.contenu {
        return Ok(false);
    }
    db::update_article_contents(conn, article.pk, paragraphs)?;

    let event = Event::new(
        "article_content_updated",
        "article",
        &article.pk.to_string(),
        serde_json::json!({
            "subdivision": article.subdivision.to_string(),
            "paragraphs": paragraphs.len(),
        }),
        ACTOR,
    );
    db::insert_event(conn, &event)?;
    Ok(true)
}

fn set_default_article_title(conn: &Connection, article: &Article, default_title: Option<&str>) -> Result<bool> {
    if !article.titre.is_empty() {
        return Ok(false);
    }
    let Some(title) = default_title.filter(|t| !t.is_empty()) else {
        return Ok(false);
    };
    db::set_article_title(conn, article.pk, title)?;

    let event = Event::new(
        "article_title_set",
        "article",
        &article.pk.to_string(),
        serde_json::json!({ "titre": title }),
        ACTOR,
    );
    db::insert_event(conn, &event)?;
    Ok(true)
}

/// Create and refresh the articles of a lecture from its text body.
///
/// An unsupported range aborts the whole update.
pub fn update_lecture_articles(
    conn: &mut Connection,
    lecture: &LectureRef,
    items: &[TextBodyItem],
) -> Result<ArticlesOutcome, BatchError> {
    let mut outcome = ArticlesOutcome::default();
    if items.is_empty() {
        return Ok(outcome);
    }

    let tx = conn.transaction()?;
    let lecture_pk = db::get_or_create_lecture(&tx, lecture)?;

    for (index, item) in items.iter().enumerate() {
        let subdivisions = item_subdivisions(index, item)?;
        let default_title = if item.kind == "annexe" {
            item.titre.as_deref()
        } else {
            section_title(items, item)
        };

        for subdivision in &subdivisions {
            let (article, created) = db::find_or_create_article(&tx, lecture_pk, subdivision)?;
            if created {
                outcome.created += 1;
            }
            if update_article_contents(&tx, &article, item)? {
                outcome.content_updated += 1;
            }
            if set_default_article_title(&tx, &article, default_title)? {
                outcome.titles_set += 1;
            }
            debug!("Article {} up to date", article.subdivision);
        }
    }

    tx.commit()?;

    info!("{}: {}", lecture, outcome.summary());
    Ok(outcome)
}
