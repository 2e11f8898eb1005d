// Amendement Sync - Core Library
// Citation parser, range expander and the reconciliation engine behind the CLI

pub mod division;    // Citation Parser
pub mod multiplier;  // Ordinal multipliers, ranges, revision suffixes
pub mod models;
pub mod error;
pub mod db;
pub mod context;     // Read-only reference data
pub mod sources;     // One normalizer per upstream feed
pub mod reconcile;   // Reconciliation Engine
pub mod discussion;  // Discussion-Order Enricher
pub mod articles;    // Text-body enrichment
pub mod sorting;     // Display order

// Re-export commonly used types
pub use division::{
    parse_citation, parse_citation_with_title, parse_range,
    InsertPosition, SubdivisionKind, SubdivisionRef,
};
pub use multiplier::{
    expand_range, format_numero, iterate_over_mults, parse_article_title, parse_numero,
};
pub use models::{
    Amendement, AmendementFields, AmendementKey, Article, Chambre, Event,
    LectureRef, Outcome, UserContent,
};
pub use error::{BatchError, RangeError, RecordError};
pub use db::setup_database;
pub use context::{ReferenceData, TexteRef};
pub use sources::{
    detect_source, get_normalizer, load_source,
    Batch, RawRecord, SourceNormalizer, SourceType,
};
pub use reconcile::{reconcile, reconcile_batch, BatchOutcome};
pub use discussion::{enrich_with_discussion_order, DiscussionFeed, DiscussionOutcome};
pub use articles::{load_text_body, update_lecture_articles, ArticlesOutcome, TextBodyItem};
pub use sorting::sort_for_display;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
