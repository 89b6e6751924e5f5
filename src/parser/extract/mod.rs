pub mod images;
pub mod price;
pub mod subculture;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Selector};
use tracing::debug;

use super::procedure::{self, ProcedureSource};
use super::sections::LabeledSection;
use super::text::element_text;
use crate::schema::{lookup_label, Field, RawValue, Shape};

static LI_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li").unwrap());

/// Map labelled sections onto canonical fields. First occurrence of a label wins;
/// unknown labels are dropped.
pub fn extract_fields(sections: &[LabeledSection]) -> BTreeMap<Field, RawValue> {
    let mut fields = BTreeMap::new();
    let mut lifted = subculture::Lifted::default();

    for section in sections {
        let Some((field, shape)) = lookup_label(&section.label) else {
            debug!("Dropping unmapped label {:?}", section.label);
            continue;
        };
        if fields.contains_key(&field) {
            debug!("Ignoring repeated label {:?}", section.label);
            continue;
        }

        let value = match shape {
            Shape::Text => RawValue::Text(element_text(section.data)),
            Shape::List(separators) => RawValue::List(split_list(&element_text(section.data), separators)),
            Shape::Steps => RawValue::Steps(list_items(section.data)),
            Shape::Medium => RawValue::Text(fold_medium(&element_text(section.data))),
            Shape::Procedure => {
                let mut source = procedure::source_from_element(section.data);
                if field == Field::SubculturingProcedure {
                    source = lift_from_source(source, &mut lifted);
                }
                let resolved = procedure::resolve(&source);
                RawValue::Procedure {
                    description: resolved.description,
                    steps: resolved.steps,
                }
            }
        };
        fields.insert(field, value);
    }

    // explicit labels take precedence over values lifted out of the procedure text
    if let Some(ratio) = lifted.ratio {
        fields.entry(Field::SubcultivationRatio).or_insert(RawValue::Text(ratio));
    }
    if let Some(renewal) = lifted.renewal {
        fields.entry(Field::MediumRenewal).or_insert(RawValue::Text(renewal));
    }
    fields
}

fn lift_from_source(source: ProcedureSource, lifted: &mut subculture::Lifted) -> ProcedureSource {
    match source {
        ProcedureSource::Explicit { lead, steps } => ProcedureSource::Explicit {
            lead: lifted.take_from(&lead),
            steps: steps
                .iter()
                .map(|s| lifted.take_from(s))
                .filter(|s| !s.trim().is_empty())
                .collect(),
        },
        ProcedureSource::Prose(text) => ProcedureSource::Prose(lifted.take_from(&text)),
    }
}

/// Split on line breaks and the given separators; empty items dropped.
pub fn split_list(text: &str, separators: &[char]) -> Vec<String> {
    text.split(|c: char| c == '\n' || separators.contains(&c))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `<li>` items in order; without list markup, one item per line.
fn list_items(el: ElementRef) -> Vec<String> {
    let items: Vec<String> = el
        .select(&LI_SEL)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    if !items.is_empty() {
        return items;
    }
    element_text(el).lines().map(str::to_string).collect()
}

/// `"Base medium:\nEMEM\nFBS 10%"` → `"Base medium: EMEM, FBS 10%"`.
/// Only the last `:` line break starts the bullet list.
pub fn fold_medium(text: &str) -> String {
    match text.rfind(":\n") {
        Some(idx) => {
            let head = &text[..idx];
            let items: Vec<&str> = text[idx + 2..]
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect();
            if items.is_empty() {
                head.to_string()
            } else {
                format!("{}: {}", head, items.join(", "))
            }
        }
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::sections::labeled_sections;
    use scraper::Html;

    fn section_html(pairs: &[(&str, &str)]) -> String {
        pairs
            .iter()
            .map(|(t, d)| {
                format!(
                    r#"<div class="product-information__title">{}</div><div class="product-information__data">{}</div>"#,
                    t, d
                )
            })
            .collect()
    }

    #[test]
    fn shapes_by_label() {
        let html = section_html(&[
            ("Product type", "Cell line, Primary<br>Frozen"),
            ("Tissue", "Lung; Bronchus"),
            ("Atmosphere", "Air, 95%; Carbon dioxide (CO<sub>2</sub>), 5%"),
            ("Growth properties", "Adherent"),
            ("Unpacking and storage instructions", "<ol><li>Check all containers.</li><li>Store in vapor phase.</li></ol>"),
        ]);
        let doc = Html::parse_document(&html);
        let fields = extract_fields(&labeled_sections(&doc));

        assert_eq!(
            fields[&Field::ProductType],
            RawValue::List(vec!["Cell line".into(), "Primary".into(), "Frozen".into()])
        );
        assert_eq!(fields[&Field::Tissue], RawValue::List(vec!["Lung".into(), "Bronchus".into()]));
        assert_eq!(
            fields[&Field::Atmosphere],
            RawValue::List(vec![
                "Air".into(),
                "95%; Carbon dioxide (CO_2)".into(),
                "5%".into()
            ])
        );
        assert_eq!(
            fields[&Field::UnpackingInstructions],
            RawValue::Steps(vec!["Check all containers.".into(), "Store in vapor phase.".into()])
        );
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn empty_list_section_is_an_empty_list() {
        let doc = Html::parse_document(&section_html(&[("Applications", "")]));
        let fields = extract_fields(&labeled_sections(&doc));
        assert_eq!(fields[&Field::Applications], RawValue::List(vec![]));
    }

    #[test]
    fn medium_folding() {
        assert_eq!(
            fold_medium("The base medium is EMEM. To make the complete growth medium, add:\nFBS to 10%\nL-glutamine"),
            "The base medium is EMEM. To make the complete growth medium, add: FBS to 10%, L-glutamine"
        );
        assert_eq!(fold_medium("EMEM with 10% FBS"), "EMEM with 10% FBS");
    }

    #[test]
    fn subculturing_lifts_ratio_and_renewal() {
        let html = section_html(&[(
            "Subculturing procedure",
            "<p>Volumes are for a 75 cm2 flask.</p>\
             <ol><li>Remove and discard culture medium.</li><li>Add fresh medium.</li></ol>\
             <p>Subcultivation Ratio: 1:3 to 1:6 Medium Renewal: 2 to 3 times per week</p>",
        )]);
        let doc = Html::parse_document(&html);
        let fields = extract_fields(&labeled_sections(&doc));
        assert_eq!(
            fields[&Field::SubculturingProcedure],
            RawValue::Procedure {
                description: "Volumes are for a 75 cm2 flask.".into(),
                steps: vec!["Remove and discard culture medium.".into(), "Add fresh medium.".into()],
            }
        );
        assert_eq!(fields[&Field::SubcultivationRatio], RawValue::Text("1:3 to 1:6".into()));
        assert_eq!(fields[&Field::MediumRenewal], RawValue::Text("2 to 3 times per week".into()));
    }

    #[test]
    fn explicit_ratio_label_wins() {
        let html = section_html(&[
            ("Subcultivation ratio", "1:2"),
            ("Subculturing procedure", "Remove medium. Subcultivation ratio: 1:8"),
        ]);
        let doc = Html::parse_document(&html);
        let fields = extract_fields(&labeled_sections(&doc));
        assert_eq!(fields[&Field::SubcultivationRatio], RawValue::Text("1:2".into()));
    }
}
