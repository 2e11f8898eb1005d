// 📜 Citation Parser - "Article 54 bis B" → SubdivisionRef
// Total function: unparseable input becomes SubdivisionKind::Error, never a panic
//
// Grammar branches, tried in order (first match wins):
//   1. unique divisions   "Intitulé du projet de loi", "Motions"
//   2. numbered divisions "TITRE Ier : ...", "Chapitre II", "Sous-section 2"
//   3. ranges             "Articles 19 à 24" (start subdivision)
//   4. additional article "art. add. après Article 7", "avant l'article 2"
//   5. single article     "Article 1er bis", "art. 7"
//   6. annexes            "Annexe B"
//   7. free-text title    long sentence → title kind, else error

use crate::multiplier::match_multiplier;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubdivisionKind {
    /// Empty citation (amendement on the whole text)
    Empty,
    /// Intitulé of the text, or a TITRE division when numbered
    Title,
    Chapter,
    Section,
    SubSection,
    Article,
    Annex,
    Motion,
    /// Sentinel for unparseable citations
    Error,
}

impl SubdivisionKind {
    /// Storage code
    pub fn code(&self) -> &'static str {
        match self {
            SubdivisionKind::Empty => "",
            SubdivisionKind::Title => "titre",
            SubdivisionKind::Chapter => "chapitre",
            SubdivisionKind::Section => "section",
            SubdivisionKind::SubSection => "sous-section",
            SubdivisionKind::Article => "article",
            SubdivisionKind::Annex => "annexe",
            SubdivisionKind::Motion => "motion",
            SubdivisionKind::Error => "erreur",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let kind = match code {
            "" => SubdivisionKind::Empty,
            "titre" => SubdivisionKind::Title,
            "chapitre" => SubdivisionKind::Chapter,
            "section" => SubdivisionKind::Section,
            "sous-section" => SubdivisionKind::SubSection,
            "article" => SubdivisionKind::Article,
            "annexe" => SubdivisionKind::Annex,
            "motion" => SubdivisionKind::Motion,
            "erreur" => SubdivisionKind::Error,
            _ => return None,
        };
        Some(kind)
    }

    /// Short label used in display strings
    fn label(&self) -> &'static str {
        match self {
            SubdivisionKind::Article => "art.",
            other => other.code(),
        }
    }
}

/// Where an additional article goes, relative to the cited one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsertPosition {
    #[default]
    None,
    Before,
    After,
}

impl InsertPosition {
    pub fn code(&self) -> &'static str {
        match self {
            InsertPosition::None => "",
            InsertPosition::Before => "avant",
            InsertPosition::After => "après",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "" => Some(InsertPosition::None),
            "avant" => Some(InsertPosition::Before),
            "après" | "apres" => Some(InsertPosition::After),
            _ => None,
        }
    }
}

/// Identity of a point in a legislative text.
///
/// All four fields together are the natural key of an Article within a
/// lecture: two refs denote the same subdivision iff they are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubdivisionRef {
    pub kind: SubdivisionKind,
    /// Decimal, Roman ("Ier", "IV"), "0" for liminaire, or a letter for annexes
    pub number: String,
    /// "bis", "ter", "bis A"... empty if none
    pub multiplier: String,
    pub position: InsertPosition,
}

impl SubdivisionRef {
    pub fn new(
        kind: SubdivisionKind,
        number: impl Into<String>,
        multiplier: impl Into<String>,
        position: InsertPosition,
    ) -> Self {
        SubdivisionRef {
            kind,
            number: number.into(),
            multiplier: multiplier.into(),
            position,
        }
    }

    fn bare(kind: SubdivisionKind) -> Self {
        SubdivisionRef::new(kind, "", "", InsertPosition::None)
    }

    pub fn empty() -> Self {
        SubdivisionRef::bare(SubdivisionKind::Empty)
    }

    pub fn error() -> Self {
        SubdivisionRef::bare(SubdivisionKind::Error)
    }

    pub fn title() -> Self {
        SubdivisionRef::bare(SubdivisionKind::Title)
    }

    pub fn article(number: impl Into<String>, multiplier: impl Into<String>) -> Self {
        SubdivisionRef::new(SubdivisionKind::Article, number, multiplier, InsertPosition::None)
    }

    pub fn is_error(&self) -> bool {
        self.kind == SubdivisionKind::Error
    }
}

impl fmt::Display for SubdivisionRef {
    /// "Après art. 7 bis", "Chapitre II", "Annexe B"
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            self.position.code(),
            self.kind.label(),
            self.number.as_str(),
            self.multiplier.as_str(),
        ];
        let text = parts
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        let mut chars = text.chars();
        match chars.next() {
            Some(first) => write!(f, "{}{}", first.to_uppercase(), chars.as_str()),
            None => Ok(()),
        }
    }
}

// ============================================================================
// CURSOR - tiny backtracking scanner
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Cursor { rest: text }
    }

    fn is_done(&self) -> bool {
        self.rest.is_empty()
    }

    /// Case-insensitive literal
    fn keyword(&mut self, word: &str) -> bool {
        let mut consumed = 0;
        let mut chars = self.rest.chars();
        for expected in word.chars() {
            match chars.next() {
                Some(c) if c.to_lowercase().eq(expected.to_lowercase()) => {
                    consumed += c.len_utf8()
                }
                _ => return false,
            }
        }
        self.rest = &self.rest[consumed..];
        true
    }

    /// First of several keywords that matches
    fn keyword_from(&mut self, words: &[&str]) -> bool {
        words.iter().any(|word| {
            let mut lookahead = *self;
            if lookahead.keyword(word) {
                *self = lookahead;
                true
            } else {
                false
            }
        })
    }

    /// One space (input is normalized, runs are collapsed)
    fn whitespace(&mut self) -> bool {
        match self.rest.strip_prefix(' ') {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn at_boundary(&self) -> bool {
        self.rest.chars().next().map_or(true, |c| !c.is_alphanumeric())
    }

    /// Longest prefix made of chars matching `pred`, if followed by a word boundary
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> Option<&'a str> {
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| !pred(*c))
            .map_or(self.rest.len(), |(i, _)| i);
        if end == 0 {
            return None;
        }
        let lookahead = Cursor::new(&self.rest[end..]);
        if !lookahead.at_boundary() {
            return None;
        }
        let token = &self.rest[..end];
        self.rest = lookahead.rest;
        Some(token)
    }

    /// Word followed by a boundary
    fn word(&mut self, word: &str) -> bool {
        let mut lookahead = *self;
        if lookahead.keyword(word) && lookahead.at_boundary() {
            *self = lookahead;
            true
        } else {
            false
        }
    }

    /// Division number: "liminaire" → "0", "premier"/"unique"/"1er" → "1",
    /// digits, Roman numerals (kept literal)
    fn numero(&mut self) -> Option<String> {
        if self.word("liminaire") {
            return Some("0".to_string());
        }
        if ["premier", "première", "unique", "1er", "1re", "1ère"]
            .iter()
            .any(|w| self.word(w))
        {
            return Some("1".to_string());
        }
        if let Some(rest) = self.rest.strip_prefix("Ier") {
            let lookahead = Cursor::new(rest);
            if lookahead.at_boundary() {
                self.rest = rest;
                return Some("Ier".to_string());
            }
        }
        self.take_while(|c| c.is_ascii_digit())
            .or_else(|| self.take_while(|c| "IVXLCDM".contains(c)))
            .map(str::to_string)
    }

    /// Annexes are also numbered by letters ("Annexe B")
    fn annex_numero(&mut self) -> Option<String> {
        let mut lookahead = *self;
        if !lookahead.whitespace() {
            return None;
        }
        let num = lookahead
            .numero()
            .or_else(|| lookahead.take_while(|c| c.is_ascii_uppercase()).map(str::to_string))?;
        *self = lookahead;
        Some(num)
    }

    /// Uppercase extension letters ("A", "AAA")
    fn additionnel(&mut self) -> Option<String> {
        let mut lookahead = *self;
        let letters = lookahead.take_while(|c| c.is_ascii_uppercase())?;
        if letters.len() > MAX_EXTENSION_LETTERS {
            return None;
        }
        *self = lookahead;
        Some(letters.to_string())
    }

    /// Multiplier, optionally compound: "bis", "bis AAA", "A"
    fn mult_add(&mut self) -> Option<String> {
        if let Some((mult, len)) = match_multiplier(&self.rest.to_ascii_lowercase()) {
            self.rest = &self.rest[len..];
            let mut lookahead = *self;
            if lookahead.whitespace() {
                if let Some(letters) = lookahead.additionnel() {
                    *self = lookahead;
                    return Some(format!("{} {}", mult, letters));
                }
            }
            return Some(mult.to_string());
        }
        self.additionnel()
    }

    /// Optional " <mult>" after a number
    fn optional_mult(&mut self) -> String {
        let mut lookahead = *self;
        if lookahead.whitespace() {
            if let Some(mult) = lookahead.mult_add() {
                *self = lookahead;
                return mult;
            }
        }
        String::new()
    }

    /// " <numero>" required
    fn spaced_numero(&mut self) -> Option<String> {
        let mut lookahead = *self;
        if !lookahead.whitespace() {
            return None;
        }
        let num = lookahead.numero()?;
        *self = lookahead;
        Some(num)
    }

    /// Whatever follows a complete citation is discarded, as long as it
    /// does not glue onto the last token.
    fn tail_ok(&self) -> bool {
        self.at_boundary()
    }
}

/// Longer uppercase runs are words, not insertion letters.
const MAX_EXTENSION_LETTERS: usize = 4;

/// Minimum word count for an unparsed citation to be read as a text title.
const TITLE_MIN_WORDS: usize = 5;

// ============================================================================
// NORMALIZATION
// ============================================================================

fn annotation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "(nouveau)", "(précédemment examiné)", "(supprimé)", "(cf. art. 3)"...
    RE.get_or_init(|| Regex::new(r"\s+\([^()]*\)").expect("annotation regex is valid"))
}

/// Collapse every kind of whitespace, unify apostrophes, drop parenthesized annotations
pub fn normalize(text: &str) -> String {
    let unified: String = text
        .chars()
        .map(|c| match c {
            '\u{a0}' | '\u{202f}' | '\u{2009}' => ' ',
            '\u{2019}' => '\'',
            c => c,
        })
        .collect();
    let collapsed = unified.split_whitespace().collect::<Vec<_>>().join(" ");
    annotation_re().replace_all(&collapsed, "").trim().to_string()
}

// ============================================================================
// GRAMMAR BRANCHES
// ============================================================================

fn unique_division(text: &str) -> Option<SubdivisionRef> {
    let mut cursor = Cursor::new(text);
    if cursor.keyword_from(&[
        "Intitulé du projet de loi constitutionnelle",
        "Intitulé du projet de loi",
        "Intitulé de la proposition de loi",
    ]) {
        return Some(SubdivisionRef::title());
    }
    let mut cursor = Cursor::new(text);
    if cursor.word("Motions") || cursor.word("Motion") {
        return Some(SubdivisionRef::bare(SubdivisionKind::Motion));
    }
    None
}

fn numbered_division(text: &str) -> Option<SubdivisionRef> {
    let mut cursor = Cursor::new(text);
    let kind = [
        ("Sous-section", SubdivisionKind::SubSection),
        ("Soussection", SubdivisionKind::SubSection),
        ("Chapitre", SubdivisionKind::Chapter),
        ("Titre", SubdivisionKind::Title),
        ("Section", SubdivisionKind::Section),
    ]
    .iter()
    .find(|(word, _)| cursor.word(word))
    .map(|(_, kind)| *kind)?;

    let number = cursor.spaced_numero()?;
    let multiplier = cursor.optional_mult();
    cursor
        .tail_ok()
        .then(|| SubdivisionRef::new(kind, number, multiplier, InsertPosition::None))
}

/// "Articles 19 à 24" → both endpoints
fn range_endpoints(text: &str) -> Option<(SubdivisionRef, SubdivisionRef)> {
    let mut cursor = Cursor::new(text);
    if !(cursor.word("Articles") || cursor.word("Article")) {
        return None;
    }
    let start_num = cursor.spaced_numero()?;
    let start_mult = cursor.optional_mult();
    if !(cursor.whitespace() && cursor.word("à")) {
        return None;
    }
    let end_num = cursor.spaced_numero()?;
    let end_mult = cursor.optional_mult();
    cursor.tail_ok().then(|| {
        (
            SubdivisionRef::article(start_num, start_mult),
            SubdivisionRef::article(end_num, end_mult),
        )
    })
}

fn single_article(text: &str) -> Option<SubdivisionRef> {
    let mut cursor = Cursor::new(text);
    if !(cursor.word("Article") || cursor.keyword("art.")) {
        return None;
    }
    // "Article Article 3" shows up in some exports
    let mut doubled = cursor;
    if doubled.whitespace() && doubled.word("Article") {
        cursor = doubled;
    }
    let number = cursor.spaced_numero()?;
    let multiplier = cursor.optional_mult();
    cursor
        .tail_ok()
        .then(|| SubdivisionRef::article(number, multiplier))
}

fn additional_article(text: &str) -> Option<SubdivisionRef> {
    let mut cursor = Cursor::new(text);

    let mut prefixed = cursor;
    if prefixed.keyword_from(&[
        "art. add.",
        "div. add.",
        "Article(s) additionnel(s)",
        "Articles additionnels",
        "Article additionnel",
    ]) && prefixed.whitespace()
    {
        cursor = prefixed;
    }

    let position = if cursor.word("avant") {
        InsertPosition::Before
    } else if cursor.word("après") || cursor.word("apres") {
        InsertPosition::After
    } else {
        return None;
    };
    if !cursor.whitespace() {
        return None;
    }
    cursor.keyword("l'");

    let kind = if cursor.word("Article") {
        SubdivisionKind::Article
    } else if cursor.word("Titre") {
        SubdivisionKind::Title
    } else {
        return None;
    };
    let number = cursor.spaced_numero()?;
    let multiplier = cursor.optional_mult();
    cursor
        .tail_ok()
        .then(|| SubdivisionRef::new(kind, number, multiplier, position))
}

fn annex(text: &str) -> Option<SubdivisionRef> {
    let mut cursor = Cursor::new(text);
    if !cursor.word("Annexe") {
        return None;
    }
    let number = cursor.annex_numero().unwrap_or_default();
    cursor.tail_ok().then(|| {
        SubdivisionRef::new(SubdivisionKind::Annex, number, "", InsertPosition::None)
    })
}

fn looks_like_title(text: &str) -> bool {
    text.split(' ').count() >= TITLE_MIN_WORDS
        && text.chars().next().is_some_and(|c| c.is_alphabetic())
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parse a free-form citation into a subdivision identity.
///
/// Never fails: empty input gives the empty kind, a long sentence gives
/// the title kind, anything else that no branch accepts gives the error kind.
pub fn parse_citation(text: &str) -> SubdivisionRef {
    parse_citation_with_title(text, None)
}

/// Same as [`parse_citation`], also recognizing the text's own long title.
pub fn parse_citation_with_title(text: &str, texte_title: Option<&str>) -> SubdivisionRef {
    let text = normalize(text);
    if text.is_empty() {
        return SubdivisionRef::empty();
    }
    if let Some(title) = texte_title {
        if normalize(title).to_lowercase() == text.to_lowercase() {
            return SubdivisionRef::title();
        }
    }

    unique_division(&text)
        .or_else(|| numbered_division(&text))
        .or_else(|| range_endpoints(&text).map(|(start, _)| start))
        .or_else(|| additional_article(&text))
        .or_else(|| single_article(&text))
        .or_else(|| annex(&text))
        .unwrap_or_else(|| {
            if looks_like_title(&text) {
                SubdivisionRef::title()
            } else {
                SubdivisionRef::error()
            }
        })
}

/// Recognize a range citation ("Articles 1 à 2"), returning both endpoints.
pub fn parse_range(text: &str) -> Option<(SubdivisionRef, SubdivisionRef)> {
    range_endpoints(&normalize(text))
}
