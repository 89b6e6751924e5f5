use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::text::element_text;
use crate::catalog::normalize_catalog_number;
use crate::config::selectors;

static NAME_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(selectors::PRODUCT_NAME).unwrap());
static CATALOG_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(selectors::CATALOG_NUMBER).unwrap());
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(selectors::INFO_TITLE).unwrap());
static TITLE_OR_DATA_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(&format!("{}, {}", selectors::INFO_TITLE, selectors::INFO_DATA)).unwrap()
});

/// A `title` element paired with the `data` element that follows it.
#[derive(Debug, Clone)]
pub struct LabeledSection<'a> {
    pub label: String,
    pub data: ElementRef<'a>,
}

/// Walk title/data elements in document order and pair each title with the
/// next data element. Titles without data are dropped.
pub fn labeled_sections(doc: &Html) -> Vec<LabeledSection<'_>> {
    let mut out = Vec::new();
    let mut pending: Option<String> = None;

    for el in doc.select(&TITLE_OR_DATA_SEL) {
        if TITLE_SEL.matches(&el) {
            let label = element_text(el).replace('\n', " ");
            pending = Some(label.trim().to_string());
        } else if let Some(label) = pending.take() {
            out.push(LabeledSection { label, data: el });
        }
    }
    out
}

/// Product display name (first heading match), whitespace collapsed.
pub fn product_name(doc: &Html) -> Option<String> {
    doc.select(&NAME_SEL)
        .map(|el| element_text(el).replace('\n', " "))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|t| !t.is_empty())
}

/// Catalog number from the hero badge (`data-catalog-number` wins over text),
/// falling back to an "ATCC number" labelled section.
pub fn catalog_number(doc: &Html, sections: &[LabeledSection]) -> Option<String> {
    let from_badge = doc.select(&CATALOG_SEL).find_map(|el| {
        el.value()
            .attr("data-catalog-number")
            .map(str::to_string)
            .or_else(|| Some(element_text(el)))
            .map(|t| strip_catalog_prefix(&t))
            .filter(|t| !t.is_empty())
    });

    from_badge.or_else(|| {
        sections
            .iter()
            .find(|s| {
                let l = s.label.to_ascii_lowercase();
                l == "atcc number" || l == "catalog number"
            })
            .map(|s| strip_catalog_prefix(&element_text(s.data)))
            .filter(|t| !t.is_empty())
    })
}

/// `"ATCC® CRL-1658™"` → `"CRL-1658"`.
fn strip_catalog_prefix(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '®' | '™')).collect();
    let cleaned = cleaned.trim();
    let rest = match cleaned.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("ATCC ") => &cleaned[5..],
        _ => cleaned,
    };
    normalize_catalog_number(rest)
}
