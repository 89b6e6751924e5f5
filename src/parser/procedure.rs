use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use super::text::{element_text, element_text_without};
use crate::clean::{canonicalize, collapse_whitespace, split_sentences};

static LI_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li").unwrap());
static LEGACY_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)handling procedure for frozen cells:?").unwrap());
// "Step 1:" opening a line or following a sentence end; "repeat step 1." is prose
static STEP_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(?:^|[.!?:]\s+)\s*(step\s+(\d{1,2})\s*:)\s*").unwrap()
});
// "1. Thaw", "2) Remove": numeral, terminator, whitespace, capital letter
static NUMERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(\d{1,2})[.)]\s+[A-Z]").unwrap());

const TRAILER: &str = "CATALOG DESCRIPTION";

/// How the source encoded a procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcedureSource {
    /// Steps were already delimited (list markup, `Step N:`, numerals, bullets).
    Explicit { lead: String, steps: Vec<String> },
    /// One prose block that still needs sentence segmentation.
    Prose(String),
}

/// Description plus ordered steps; step numbering is positional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved {
    pub description: String,
    pub steps: Vec<String>,
}

pub trait StepStrategy {
    fn accepts(&self, source: &ProcedureSource) -> bool;
    fn resolve(&self, source: &ProcedureSource) -> Resolved;
}

pub struct ExplicitSteps;
pub struct ProseSteps;

const STRATEGIES: &[&dyn StepStrategy] = &[&ExplicitSteps, &ProseSteps];

/// Resolve either encoding to one canonical procedure.
pub fn resolve(source: &ProcedureSource) -> Resolved {
    STRATEGIES
        .iter()
        .find(|s| s.accepts(source))
        .map(|s| s.resolve(source))
        .unwrap_or_default()
}

impl StepStrategy for ExplicitSteps {
    fn accepts(&self, source: &ProcedureSource) -> bool {
        matches!(source, ProcedureSource::Explicit { .. })
    }

    fn resolve(&self, source: &ProcedureSource) -> Resolved {
        let ProcedureSource::Explicit { lead, steps } = source else {
            return Resolved::default();
        };
        Resolved {
            description: collapse_whitespace(lead),
            steps: steps
                .iter()
                .map(|s| collapse_whitespace(s))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

impl StepStrategy for ProseSteps {
    fn accepts(&self, source: &ProcedureSource) -> bool {
        matches!(source, ProcedureSource::Prose(_))
    }

    /// Sentences before the first imperative are description; each imperative
    /// opens a step; anything else after a step continues that step.
    fn resolve(&self, source: &ProcedureSource) -> Resolved {
        let ProcedureSource::Prose(text) = source else {
            return Resolved::default();
        };
        let mut description: Vec<String> = Vec::new();
        let mut steps: Vec<String> = Vec::new();

        // line breaks from block markup are hard boundaries; boundaries are
        // chosen on canonical text so references and symbols cannot shift them
        for line in text.lines() {
            for sentence in split_sentences(&canonicalize(line)) {
                if is_imperative(&sentence) {
                    steps.push(sentence);
                } else if let Some(last) = steps.last_mut() {
                    last.push(' ');
                    last.push_str(&sentence);
                } else {
                    description.push(sentence);
                }
            }
        }

        Resolved {
            description: description.join(" "),
            steps,
        }
    }
}

// ── Detection ──

/// Read a procedure's data element: list markup first, then in-text numbering,
/// otherwise prose.
pub fn source_from_element(el: ElementRef) -> ProcedureSource {
    let items: Vec<String> = el
        .select(&LI_SEL)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    if !items.is_empty() {
        return ProcedureSource::Explicit {
            lead: element_text_without(el, &["ol", "ul"]),
            steps: items,
        };
    }
    source_from_text(&element_text(el))
}

pub fn source_from_text(text: &str) -> ProcedureSource {
    let text = LEGACY_HEADER_RE.replace_all(text, "");
    let text = match text.find(TRAILER) {
        Some(idx) => &text[..idx],
        None => &text[..],
    };

    if let Some((lead, steps)) = split_step_words(text)
        .or_else(|| split_numerals(text))
        .or_else(|| split_bullets(text))
    {
        return ProcedureSource::Explicit { lead, steps };
    }
    ProcedureSource::Prose(text.trim().to_string())
}

/// (marker start, content start) pairs → lead + step slices.
fn cut(text: &str, markers: &[(usize, usize)]) -> (String, Vec<String>) {
    let lead = text[..markers[0].0].trim().to_string();
    let steps = markers
        .iter()
        .enumerate()
        .map(|(i, &(_, content))| {
            let end = markers.get(i + 1).map(|m| m.0).unwrap_or(text.len());
            text[content..end].trim().to_string()
        })
        .collect();
    (lead, steps)
}

/// Keep only markers numbered 1, 2, 3, ... in order.
fn sequential(found: impl Iterator<Item = (usize, usize, usize)>) -> Vec<(usize, usize)> {
    let mut expected = 1;
    let mut markers = Vec::new();
    for (n, start, content) in found {
        if n == expected {
            markers.push((start, content));
            expected += 1;
        }
    }
    markers
}

fn split_step_words(text: &str) -> Option<(String, Vec<String>)> {
    let markers = sequential(STEP_WORD_RE.captures_iter(text).filter_map(|c| {
        let marker = c.get(1)?;
        let n = c[2].parse().ok()?;
        Some((n, marker.start(), c.get(0)?.end()))
    }));
    (markers.len() >= 2).then(|| cut(text, &markers))
}

fn split_numerals(text: &str) -> Option<(String, Vec<String>)> {
    let markers = sequential(NUMERAL_RE.captures_iter(text).filter_map(|c| {
        let num = c.get(1)?;
        let whole = c.get(0)?;
        if refers_to_step(&text[..num.start()]) {
            return None;
        }
        let n = num.as_str().parse().ok()?;
        // content starts at the capital letter (last char of the match)
        Some((n, num.start(), whole.end() - 1))
    }));
    (markers.len() >= 2).then(|| cut(text, &markers))
}

/// "see step 2. Then" is a cross-reference, not a numbered item.
fn refers_to_step(before: &str) -> bool {
    before
        .trim_end()
        .rsplit(char::is_whitespace)
        .next()
        .is_some_and(|w| w.eq_ignore_ascii_case("step") || w.eq_ignore_ascii_case("steps"))
}

fn split_bullets(text: &str) -> Option<(String, Vec<String>)> {
    let mut lead: Vec<&str> = Vec::new();
    let mut steps: Vec<String> = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("• ")) {
            steps.push(rest.trim().to_string());
        } else if let Some(last) = steps.last_mut() {
            last.push(' ');
            last.push_str(line);
        } else {
            lead.push(line);
        }
    }
    (steps.len() >= 2).then(|| (lead.join("\n"), steps))
}

// ── Imperative heuristic ──

/// Lab-protocol verbs that open an instruction.
const IMPERATIVE_VERBS: &[&str] = &[
    "add", "adjust", "agitate", "allow", "aliquot", "aspirate", "avoid", "centrifuge", "change",
    "check", "collect", "combine", "continue", "cool", "count", "culture", "decant", "decontaminate",
    "determine", "dilute", "discard", "dispense", "disperse", "dispose", "dissociate", "ensure",
    "examine", "feed", "fill", "freeze", "harvest", "hold", "incubate", "inoculate", "keep", "label",
    "leave", "let", "maintain", "make", "mix", "monitor", "observe", "open", "perform", "pipette",
    "place", "plate", "pour", "prepare", "pre-warm", "prewarm", "record", "refeed", "remove",
    "renew", "repeat", "replace", "resuspend", "return", "rinse", "seed", "shake", "spin", "split",
    "spray", "store", "subculture", "swirl", "tap", "thaw", "transfer", "use", "wait", "warm",
    "wash", "wipe",
];

/// Adverbs and connectives that may precede the verb.
const LEAD_INS: &[&str] = &[
    "then", "next", "gently", "carefully", "immediately", "quickly", "slowly", "briefly",
    "finally", "first", "afterwards", "also", "again", "now", "subsequently", "thoroughly",
    "aseptically", "always", "please",
];

pub fn is_imperative(sentence: &str) -> bool {
    let words: Vec<String> = sentence
        .split_whitespace()
        .take(6)
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    let mut rest = words.iter().map(String::as_str).skip_while(|w| LEAD_INS.contains(w));
    match rest.next() {
        Some("do") => rest.next() == Some("not"),
        Some("don't") | Some("never") => true,
        Some(w) => IMPERATIVE_VERBS.contains(&w),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn step_keys(r: &Resolved) -> Vec<String> {
        (1..=r.steps.len()).map(|n| n.to_string()).collect()
    }

    #[test]
    fn list_markup_is_explicit() {
        let doc = Html::parse_fragment(
            "<div id=p>Frozen cells arrive on dry ice.<ol><li>Thaw the vial.</li><li>Remove the cap.</li></ol></div>",
        );
        let sel = Selector::parse("#p").unwrap();
        let source = source_from_element(doc.select(&sel).next().unwrap());
        let r = resolve(&source);
        assert!(matches!(source, ProcedureSource::Explicit { .. }));
        assert_eq!(r.description, "Frozen cells arrive on dry ice.");
        assert_eq!(r.steps, vec!["Thaw the vial.", "Remove the cap."]);
    }

    #[test]
    fn numbered_paragraph_is_explicit() {
        let text = "Handling Procedure for Frozen Cells To insure the highest level of viability, thaw quickly. \
                    1. Thaw the vial by gentle agitation in a 37 degrees C water bath. \
                    2. Remove the vial and add 2.0 mL of medium. \
                    3. Centrifuge at 125 x g for 5 to 7 minutes. \
                    CATALOG DESCRIPTION This line is dropped.";
        let r = resolve(&source_from_text(text));
        assert_eq!(r.description, "To insure the highest level of viability, thaw quickly.");
        assert_eq!(r.steps.len(), 3);
        assert!(r.steps[1].starts_with("Remove the vial and add 2.0 mL"));
        assert!(r.steps.iter().all(|s| !s.contains("CATALOG")));
    }

    #[test]
    fn out_of_order_numerals_stay_in_text() {
        let text = "Intro. 1. Add medium. 3. Not a step marker. 2. Incubate overnight.";
        let r = resolve(&source_from_text(text));
        assert_eq!(r.steps, vec!["Add medium. 3. Not a step marker.", "Incubate overnight."]);
    }

    #[test]
    fn step_word_markers() {
        let r = resolve(&source_from_text("Step 1: Thaw the vial. Step 2: Transfer to a tube."));
        assert_eq!(r.steps, vec!["Thaw the vial.", "Transfer to a tube."]);
        assert_eq!(r.description, "");
    }

    #[test]
    fn step_cross_reference_stays_prose() {
        let text = "Remove and discard culture medium. Rinse the cell layer with PBS. \
                    Repeat step 1. Add 2.0 mL of trypsin.";
        let source = source_from_text(text);
        assert!(matches!(source, ProcedureSource::Prose(_)));
        let r = resolve(&source);
        assert_eq!(r.description, "");
        assert_eq!(
            r.steps,
            vec![
                "Remove and discard culture medium.",
                "Rinse the cell layer with PBS.",
                "Repeat step 1.",
                "Add 2.0 mL of trypsin."
            ]
        );
    }

    #[test]
    fn single_step_word_marker_is_not_a_list() {
        let source = source_from_text("Thaw the vial. Step 1: Transfer to a tube.");
        assert!(matches!(source, ProcedureSource::Prose(_)));
    }

    #[test]
    fn prose_with_unit_word_endings() {
        let r = resolve(&source_from_text(
            "Centrifuge at 125 x g for 5 min. Discard the supernatant. Incubate for 1 hr. Add medium.",
        ));
        assert_eq!(r.steps.len(), 4);
        assert_eq!(r.steps[0], "Centrifuge at 125 x g for 5 min.");
    }

    #[test]
    fn cross_reference_does_not_move_boundaries() {
        let with_ref = resolve(&source_from_text(
            "Rinse the layer with DPBS. (ATCC 30-2200) Add 2.0 mL of trypsin.",
        ));
        let without = resolve(&source_from_text("Rinse the layer with DPBS. Add 2.0 mL of trypsin."));
        assert_eq!(with_ref.steps.len(), 2);
        assert_eq!(with_ref, without);

        // zero-width space hides the boundary until symbols are substituted
        let r = resolve(&source_from_text("Remove the medium.\u{200b} Add trypsin."));
        assert_eq!(r.steps, vec!["Remove the medium.", "Add trypsin."]);
    }

    #[test]
    fn dash_bullets() {
        let r = resolve(&source_from_text("Volumes are for a T-75 flask.\n- Remove medium.\n- Rinse with PBS.\nuse 5 mL"));
        assert_eq!(r.description, "Volumes are for a T-75 flask.");
        assert_eq!(r.steps, vec!["Remove medium.", "Rinse with PBS. use 5 mL"]);
    }

    #[test]
    fn prose_splits_description_and_steps() {
        let text = "Volumes used in this protocol are for 75 cm2 flasks. \
                    Remove and discard culture medium. \
                    Briefly rinse the cell layer with 0.25% trypsin. \
                    Add 2.0 to 3.0 mL of Trypsin-EDTA solution to flask. \
                    Cells usually detach within 5 to 15 minutes. \
                    Add 6.0 to 8.0 mL of complete growth medium.";
        let source = source_from_text(text);
        assert!(matches!(source, ProcedureSource::Prose(_)));
        let r = resolve(&source);
        assert_eq!(r.description, "Volumes used in this protocol are for 75 cm2 flasks.");
        assert_eq!(r.steps.len(), 4);
        assert_eq!(step_keys(&r), vec!["1", "2", "3", "4"]);
        assert_eq!(
            r.steps[2],
            "Add 2.0 to 3.0 mL of Trypsin-EDTA solution to flask. Cells usually detach within 5 to 15 minutes."
        );
    }

    #[test]
    fn prose_without_imperatives_is_all_description() {
        let r = resolve(&source_from_text("Cells grow as a monolayer. They are adherent."));
        assert!(r.steps.is_empty());
        assert_eq!(r.description, "Cells grow as a monolayer. They are adherent.");
    }

    #[test]
    fn imperative_detection() {
        assert!(is_imperative("Thaw the vial."));
        assert!(is_imperative("Then, gently add medium."));
        assert!(is_imperative("Do not shake the flask."));
        assert!(!is_imperative("Do cells grow?"));
        assert!(!is_imperative("Note: cells are fragile."));
        assert!(!is_imperative("15 minutes later."));
    }
}
