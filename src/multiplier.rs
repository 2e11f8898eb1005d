// 🔢 Multiplier Sequencer - bis, ter, quater...
// One ordinal-suffix table, shared by article ranges and amendement revisions
//
// "34 bis A à 34 bis C" → 34 bis A, 34 bis B, 34 bis C
// "12 rect. ter"        → num 12, revision 3

use crate::division::{normalize, parse_citation, parse_range, SubdivisionKind, SubdivisionRef};
use crate::error::{RangeError, RecordError};
use regex::Regex;
use std::sync::OnceLock;

// ============================================================================
// ORDINAL TABLE
// ============================================================================

/// Canonical ordinal suffixes in insertion order: `bis` is the 2nd item of a
/// series, `tricies` the 30th.
///
/// This is also the upper bound of everything built on top of the table:
/// ranges cannot enumerate past `tricies`, revisions past 30 cannot be
/// decoded, and compound suffixes only enumerate a single trailing letter
/// (`bis A` .. `bis Z`). Anything beyond is reported as an error instead of
/// guessing an extension.
pub const MULTIPLIERS: [&str; 29] = [
    "bis",
    "ter",
    "quater",
    "quinquies",
    "sexies",
    "septies",
    "octies",
    "nonies",
    "decies",
    "undecies",
    "duodecies",
    "terdecies",
    "quaterdecies",
    "quindecies",
    "sexdecies",
    "septdecies",
    "octodecies",
    "novodecies",
    "vicies",
    "unvicies",
    "duovicies",
    "tervicies",
    "quatervicies",
    "quinvicies",
    "sexvicies",
    "septvicies",
    "duodetrecies",
    "undetricies",
    "tricies",
];

/// Spellings accepted when parsing, mapped to their canonical form.
const ALIASES: [(&str, &str); 1] = [("novies", "nonies")];

/// Canonical form of a multiplier word (`novies` → `nonies`).
pub fn canonical(word: &str) -> Option<&'static str> {
    if let Some(found) = MULTIPLIERS.iter().find(|m| **m == word) {
        return Some(*found);
    }
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == word)
        .map(|(_, canonical)| *canonical)
}

/// Ordinal value of a multiplier word: bis → 2, ter → 3, ..., tricies → 30
pub fn ordinal(word: &str) -> Option<u32> {
    let word = canonical(word)?;
    MULTIPLIERS
        .iter()
        .position(|m| *m == word)
        .map(|index| index as u32 + 2)
}

/// Inverse of [`ordinal`]
pub fn multiplier_for(ordinal: u32) -> Option<&'static str> {
    if ordinal < 2 {
        return None;
    }
    MULTIPLIERS.get((ordinal - 2) as usize).copied()
}

/// Longest vocabulary word at the start of `text`, followed by a word boundary.
///
/// Returns the canonical word and the number of bytes consumed.
pub(crate) fn match_multiplier(text: &str) -> Option<(&'static str, usize)> {
    let candidates = MULTIPLIERS
        .iter()
        .map(|m| (*m, *m))
        .chain(ALIASES.iter().map(|(alias, canonical)| (*alias, *canonical)));

    let mut best: Option<(&'static str, usize)> = None;
    for (spelling, canonical) in candidates {
        if !text.starts_with(spelling) {
            continue;
        }
        let boundary = text[spelling.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if boundary && best.map_or(true, |(_, len)| spelling.len() > len) {
            best = Some((canonical, spelling.len()));
        }
    }
    best
}

/// Split a multiplier into its ordinal part and its letter extension.
///
/// "bis A" → ("bis", "A"), "bis" → ("bis", ""), "A" → ("", "A")
fn split_multiplier(mult: &str) -> (&str, &str) {
    let mult = mult.trim();
    match mult.split_once(' ') {
        Some((base, letters)) => (base, letters.trim()),
        None if canonical(mult).is_some() => (mult, ""),
        None if !mult.is_empty() && mult.chars().all(|c| c.is_ascii_uppercase()) => ("", mult),
        None => (mult, ""),
    }
}

// ============================================================================
// RANGE ENUMERATION
// ============================================================================

/// Enumerate the multipliers between `start` and `end`, both inclusive.
///
/// - `""` → `"ter"`: from the plain article up to `ter` ("", bis, ter)
/// - `"ter"` → `"quinquies"`: walk the ordinal table
/// - `"bis A"` → `"bis D"`: keep `bis`, walk the letters
pub fn iterate_over_mults(start: &str, end: &str) -> Result<Vec<String>, RangeError> {
    let (start_base, start_letters) = split_multiplier(start);
    let (end_base, end_letters) = split_multiplier(end);

    if start_letters.is_empty() && end_letters.is_empty() {
        let start_index = table_index(start_base)?;
        let end_index = table_index(end_base)?;
        if start_index > end_index {
            return Err(RangeError::Reversed {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        return Ok((start_index..=end_index)
            .map(|index| match index {
                0 => String::new(),
                i => MULTIPLIERS[i - 1].to_string(),
            })
            .collect());
    }

    // Compound suffixes: the ordinal part stays fixed.
    let base = canonical_or_empty(start_base)?;
    if base != canonical_or_empty(end_base)? || end_letters.is_empty() {
        return Err(RangeError::Unsupported {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    let first = match start_letters {
        "" => None,
        letters => Some(single_letter(letters, start, end)?),
    };
    let last = single_letter(end_letters, start, end)?;
    if first.is_some_and(|f| f > last) {
        return Err(RangeError::Reversed {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    let mut result = Vec::new();
    if first.is_none() {
        result.push(base.to_string());
    }
    for letter in first.unwrap_or('A')..=last {
        result.push(if base.is_empty() {
            letter.to_string()
        } else {
            format!("{} {}", base, letter)
        });
    }
    Ok(result)
}

/// Position in the sequence "", bis, ter, ...
fn table_index(base: &str) -> Result<usize, RangeError> {
    if base.is_empty() {
        return Ok(0);
    }
    ordinal(base)
        .map(|o| o as usize - 1)
        .ok_or_else(|| RangeError::UnknownMultiplier(base.to_string()))
}

fn canonical_or_empty(base: &str) -> Result<&'static str, RangeError> {
    if base.is_empty() {
        return Ok("");
    }
    canonical(base).ok_or_else(|| RangeError::UnknownMultiplier(base.to_string()))
}

fn single_letter(letters: &str, start: &str, end: &str) -> Result<char, RangeError> {
    let mut chars = letters.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() => Ok(c),
        _ => Err(RangeError::Unsupported {
            start: start.to_string(),
            end: end.to_string(),
        }),
    }
}

/// Read an article title with the citation grammar.
///
/// Text bodies carry bare titles ("7 bis", "1er"), read as "Article 7 bis".
/// Annotations are dropped and additional-article forms keep their position.
pub fn parse_article_title(text: &str) -> Result<SubdivisionRef, RangeError> {
    let parsed = parse_citation(text);
    if parsed.kind == SubdivisionKind::Article {
        return Ok(parsed);
    }
    let parsed = parse_citation(&format!("Article {}", text));
    if parsed.kind == SubdivisionKind::Article {
        return Ok(parsed);
    }
    Err(RangeError::InvalidNumber(normalize(text)))
}

/// Expand a citation into the article subdivisions it covers.
///
/// Accepts citation forms ("Articles 19 à 24", "art. add. après Article 7")
/// and bare titles as found in text bodies ("19 à 24", "34 bis A à 34 bis C").
pub fn expand_range(text: &str) -> Result<Vec<SubdivisionRef>, RangeError> {
    let text = normalize(text);
    let (start, end) = match parse_range(&text) {
        Some(endpoints) => endpoints,
        None => match strip_article_keyword(&text).split_once(" à ") {
            Some((start, end)) => (parse_article_title(start)?, parse_article_title(end)?),
            None => return Ok(vec![parse_article_title(&text)?]),
        },
    };

    if start.position != end.position {
        return Err(RangeError::Unsupported {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    Ok(expand_endpoints(&start, &end)?
        .into_iter()
        .map(|(num, mult)| SubdivisionRef::new(SubdivisionKind::Article, num, mult, start.position))
        .collect())
}

/// Same as [`expand_range`], as (number, multiplier) pairs.
pub fn expand_nums_mults(text: &str) -> Result<Vec<(String, String)>, RangeError> {
    Ok(expand_range(text)?
        .into_iter()
        .map(|subdivision| (subdivision.number, subdivision.multiplier))
        .collect())
}

fn expand_endpoints(
    start: &SubdivisionRef,
    end: &SubdivisionRef,
) -> Result<Vec<(String, String)>, RangeError> {
    if start.multiplier.is_empty() && end.multiplier.is_empty() {
        let first: u32 = start
            .number
            .parse()
            .map_err(|_| RangeError::InvalidNumber(start.number.clone()))?;
        let last: u32 = end
            .number
            .parse()
            .map_err(|_| RangeError::InvalidNumber(end.number.clone()))?;
        if first > last {
            return Err(RangeError::Reversed {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok((first..=last).map(|n| (n.to_string(), String::new())).collect())
    } else if start.number == end.number {
        Ok(iterate_over_mults(&start.multiplier, &end.multiplier)?
            .into_iter()
            .map(|mult| (start.number.clone(), mult))
            .collect())
    } else {
        Err(RangeError::Unsupported {
            start: start.to_string(),
            end: end.to_string(),
        })
    }
}

fn strip_article_keyword(title: &str) -> &str {
    for keyword in ["Articles ", "articles ", "Article ", "article "] {
        if let Some(rest) = title.strip_prefix(keyword) {
            return rest;
        }
    }
    title
}

// ============================================================================
// AMENDEMENT REVISIONS
// ============================================================================

fn numero_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<num>\d+)(?P<rect>\s+rect\.(?:\s+(?P<suffix>\w+))?)?\s*$")
            .expect("numero regex is valid")
    })
}

/// Decode an amendement number with its revision suffix.
///
/// "42" → (42, 0), "42 rect." → (42, 1), "42 rect. ter" → (42, 3).
/// "COM-42", "I-42" and "II-42" prefixes are ignored; "" → (0, 0).
pub fn parse_numero(text: &str) -> Result<(u32, u32), RecordError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok((0, 0));
    }
    let stripped = ["COM-", "II-", "I-"]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed);

    let invalid = || RecordError::InvalidNumero(text.to_string());
    let caps = numero_re().captures(stripped).ok_or_else(invalid)?;
    let num: u32 = caps["num"].parse().map_err(|_| invalid())?;

    let rectif = match (caps.name("rect"), caps.name("suffix")) {
        (None, _) => 0,
        (Some(_), None) => 1,
        (Some(_), Some(suffix)) => ordinal(suffix.as_str()).ok_or_else(invalid)?,
    };
    Ok((num, rectif))
}

/// Render a number and revision back to display text: (42, 3) → "42 rect. ter"
pub fn format_numero(num: u32, rectif: u32) -> String {
    match rectif {
        0 => num.to_string(),
        1 => format!("{} rect.", num),
        n => match multiplier_for(n) {
            Some(suffix) => format!("{} rect. {}", num, suffix),
            // Past the table: keep it readable, it cannot be parsed back.
            None => format!("{} rect. ({})", num, n),
        },
    }
}

/// Budget-bill part encoded in the number prefix: "I-12" → 1, "II-12" → 2
pub fn parse_partie(numero: &str) -> Option<u8> {
    let numero = numero.trim();
    if numero.starts_with("II-") {
        Some(2)
    } else if numero.starts_with("I-") {
        Some(1)
    } else {
        None
    }
}
