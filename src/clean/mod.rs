pub mod segment;
pub mod symbols;

use std::sync::LazyLock;

use regex::Regex;

use crate::schema::{RawFieldMap, RawValue};
pub use segment::split_sentences;
pub use symbols::GapLog;

// " (ATCC CRL-1658)", " (HeLa; ATCC CCL-2)", " [ATCC 30-2003]"
static PAREN_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\((?:[^;()]+;\s*)?ATCC\s+[^()]+\)").unwrap());
static BRACKET_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\[(?:[^;\[\]]+;\s*)?ATCC\s+[^\[\]]+\]").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Canonicalize one text leaf: symbols, cross-references, whitespace.
/// Idempotent; never reorders or drops meaning-bearing content.
pub fn clean_text(text: &str, gaps: &mut GapLog) -> String {
    let text = symbols::substitute(text, gaps);
    let text = strip_references(&text);
    collapse_whitespace(&text)
}

/// `clean_text` without gap accounting, for choosing boundaries before the
/// normalizer runs. The normalizer cleans the result again; cleaning is idempotent.
pub fn canonicalize(text: &str) -> String {
    let text = symbols::replace(text);
    let text = strip_references(&text);
    collapse_whitespace(&text)
}

pub fn strip_references(text: &str) -> String {
    let text = PAREN_REF_RE.replace_all(text, "");
    BRACKET_REF_RE.replace_all(&text, "").into_owned()
}

pub fn collapse_whitespace(text: &str) -> String {
    WS_RE.replace_all(text, " ").trim().to_string()
}

fn clean_items(items: Vec<String>, gaps: &mut GapLog) -> Vec<String> {
    items
        .into_iter()
        .map(|s| clean_text(&s, gaps))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Apply `clean_text` to every text leaf, keeping the structure of each value.
pub fn normalize(raw: RawFieldMap, gaps: &mut GapLog) -> RawFieldMap {
    let fields = raw
        .fields
        .into_iter()
        .map(|(field, value)| {
            let value = match value {
                RawValue::Text(t) => RawValue::Text(clean_text(&t, gaps)),
                RawValue::List(items) => RawValue::List(clean_items(items, gaps)),
                RawValue::Steps(items) => RawValue::Steps(clean_items(items, gaps)),
                RawValue::Procedure { description, steps } => RawValue::Procedure {
                    description: clean_text(&description, gaps),
                    steps: clean_items(steps, gaps),
                },
                RawValue::Pairs(pairs) => RawValue::Pairs(
                    pairs
                        .into_iter()
                        .map(|(a, b)| (clean_text(&a, gaps), clean_text(&b, gaps)))
                        .collect(),
                ),
                RawValue::Number(n) => RawValue::Number(n),
            };
            (field, value)
        })
        .collect();

    RawFieldMap {
        name: clean_text(&raw.name, gaps),
        catalog_number: clean_text(&raw.catalog_number, gaps),
        fields,
    }
}
