// 🚨 Error taxonomy
// Three levels: parse failure (sentinel, not here), record-level, batch-level

use thiserror::Error;

/// Range expansion failures.
///
/// These are always fatal for whatever batch triggered them: they mean the
/// upstream text uses a numbering shape we do not understand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("Unsupported article range definition: {start:?} à {end:?}")]
    Unsupported { start: String, end: String },

    #[error("Unknown multiplier {0:?}")]
    UnknownMultiplier(String),

    #[error("Invalid article number {0:?} in range")]
    InvalidNumber(String),

    #[error("Reversed range: {start:?} à {end:?}")]
    Reversed { start: String, end: String },
}

/// Failure of a single upstream record. Reported in the batch error list,
/// never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("Cannot parse amendement number '{0}'")]
    InvalidNumero(String),

    #[error("Unknown parent amendement {0}")]
    UnknownParent(String),

    #[error("Unknown auteur {0}")]
    UnknownAuteur(String),

    #[error("Unknown groupe {0}")]
    UnknownGroupe(String),

    #[error("Missing {0}")]
    MissingField(&'static str),

    #[error("Invalid boolean value '{0}'")]
    InvalidBool(String),

    #[error("Invalid date '{0}'")]
    InvalidDate(String),

    #[error("Could not extract matricule from '{0}'")]
    InvalidMatricule(String),

    #[error("Could not parse malformed TSV line: {0:?}")]
    MalformedLine(String),

    #[error("Circular parent reference on amendement {0}")]
    CircularParent(String),

    #[error("Unknown texte {0}")]
    UnknownTexte(String),
}

/// Batch-level failures: nothing from the batch is applied.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("The batch contains amendements for another lecture: {found} (expected {expected})")]
    LectureMismatch { expected: String, found: String },

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
