use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use amendement_sync::{
    db, enrich_with_discussion_order, load_source, load_text_body, reconcile_batch,
    setup_database, sort_for_display, update_lecture_articles, Chambre, DiscussionFeed,
    LectureRef, ReferenceData,
};

/// Command-line arguments for amendement-sync
#[derive(Parser, Debug)]
#[command(name = "amendement-sync")]
#[command(about = "Keep a lecture's articles and amendements in sync with upstream feeds")]
#[command(version)]
struct Cli {
    /// SQLite database
    #[arg(long, default_value = "amendements.db", env = "AMENDEMENT_SYNC_DB")]
    db: PathBuf,

    /// Reference data JSON (acteurs, organes, sénateurs, textes)
    #[arg(long, env = "AMENDEMENT_SYNC_REFERENCE")]
    reference: Option<PathBuf>,

    #[command(flatten)]
    lecture: LectureArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct LectureArgs {
    /// "an" or "senat"
    #[arg(long, value_parser = parse_chambre)]
    chambre: Chambre,

    /// Législature (AN) or session (Sénat)
    #[arg(long)]
    session: String,

    /// Texte number
    #[arg(long)]
    texte: u32,

    /// Organe examining the texte
    #[arg(long)]
    organe: String,

    /// Budget-bill part
    #[arg(long)]
    partie: Option<u8>,
}

impl LectureArgs {
    fn lecture(&self) -> LectureRef {
        LectureRef {
            chambre: self.chambre,
            session: self.session.clone(),
            texte: self.texte,
            organe: self.organe.clone(),
            partie: self.partie,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile one amendement file (source detected from its name)
    Import { file: PathBuf },
    /// Apply discussion-order files, in order
    Discussion {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Create and refresh articles from a text body
    Articles { file: PathBuf },
    /// List amendements in display order
    List {
        /// Leave out withdrawn, inadmissible and lapsed amendements
        #[arg(long)]
        hide_abandoned: bool,
    },
}

fn parse_chambre(text: &str) -> Result<Chambre, String> {
    Chambre::from_code(text).ok_or_else(|| format!("Unknown chambre {:?}", text))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "amendement_sync=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let lecture = cli.lecture.lecture();

    info!(
        "amendement-sync v{} on {} ({})",
        amendement_sync::VERSION,
        lecture,
        cli.db.display()
    );

    let mut conn = Connection::open(&cli.db)
        .with_context(|| format!("Failed to open database {}", cli.db.display()))?;
    setup_database(&conn)?;

    match &cli.command {
        Command::Import { file } => run_import(&mut conn, cli.reference.as_deref(), &lecture, file),
        Command::Discussion { files } => run_discussion(&mut conn, &lecture, files),
        Command::Articles { file } => run_articles(&mut conn, &lecture, file),
        Command::List { hide_abandoned } => run_list(&conn, &lecture, *hide_abandoned),
    }
}

fn load_reference(path: Option<&Path>) -> Result<ReferenceData> {
    match path {
        Some(path) => ReferenceData::from_path(path),
        None => Ok(ReferenceData::default()),
    }
}

fn print_errors(errors: &[(String, String)]) {
    for (identity, cause) in errors {
        println!("  ⚠️  {}: {}", identity, cause);
    }
}

fn run_import(conn: &mut Connection, reference: Option<&Path>, lecture: &LectureRef, file: &Path) -> Result<()> {
    println!("📥 Importing {}", file.display());

    let ctx = load_reference(reference)?;
    let batch = load_source(file)?;
    println!("✓ Loaded {} records ({})", batch.records.len(), batch.source.name());

    let outcome = reconcile_batch(conn, &ctx, lecture, &batch)?;
    println!("✓ {}", outcome.summary());
    print_errors(&outcome.errors);

    println!("✓ Database contains {} amendements", db::verify_count(conn)?);
    Ok(())
}

fn run_discussion(conn: &mut Connection, lecture: &LectureRef, files: &[PathBuf]) -> Result<()> {
    println!("🗂️  Applying discussion order from {} file(s)", files.len());

    let feed = DiscussionFeed::load(files)?;
    let outcome = enrich_with_discussion_order(conn, lecture, &feed)?;
    println!("✓ {}", outcome.summary());
    for key in &outcome.retracted {
        println!("  ↩️  {} retiré de la discussion", key);
    }
    print_errors(&outcome.errors);
    Ok(())
}

fn run_articles(conn: &mut Connection, lecture: &LectureRef, file: &Path) -> Result<()> {
    println!("📜 Updating articles from {}", file.display());

    let items = load_text_body(file)?;
    let outcome = update_lecture_articles(conn, lecture, &items)?;
    println!("✓ {}", outcome.summary());
    Ok(())
}

fn run_list(conn: &Connection, lecture: &LectureRef, hide_abandoned: bool) -> Result<()> {
    let Some(lecture_pk) = db::find_lecture(conn, lecture)? else {
        println!("❌ No amendements for {}", lecture);
        return Ok(());
    };

    let articles: HashMap<i64, String> = db::get_articles(conn, lecture_pk)?
        .into_iter()
        .map(|article| (article.pk, article.subdivision.to_string()))
        .collect();

    let mut amendements = db::get_amendements(conn, lecture_pk)?;
    if hide_abandoned {
        amendements.retain(|amendement| !amendement.is_abandoned());
    }
    sort_for_display(&mut amendements);

    println!("📋 {} amendements on {}\n", amendements.len(), lecture);
    for amendement in &amendements {
        let position = amendement
            .position
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        let article = amendement
            .fields
            .article_pk
            .and_then(|pk| articles.get(&pk))
            .map_or("", String::as_str);
        let marker = if amendement.gouvernemental() { "🏛️" } else { "  " };
        println!(
            "{:>5} {} {:<16} {:<24} {:<32} {}",
            position,
            marker,
            amendement.num_disp(),
            article,
            amendement.fields.auteur,
            amendement.fields.sort.code()
        );
    }
    Ok(())
}
