use std::collections::BTreeMap;

use tracing::{debug, warn};

/// Ordered (pattern, replacement) pairs, applied left to right.
/// Longer patterns must come before their prefixes (`°C` before `°`).
pub const SYMBOL_TABLE: &[(&str, &str)] = &[
    // invisible / spacing
    ("\u{00a0}", " "),
    ("\u{2002}", " "),
    ("\u{2003}", " "),
    ("\u{2009}", " "),
    ("\u{202f}", " "),
    ("\u{00ad}", ""),
    ("\u{200b}", ""),
    ("\u{feff}", ""),
    // temperature
    ("°C", " degrees Celsius"),
    ("\u{2103}", " degrees Celsius"),
    ("°F", " degrees Fahrenheit"),
    ("°", " degrees"),
    // subscript digits
    ("₀", "_0"),
    ("₁", "_1"),
    ("₂", "_2"),
    ("₃", "_3"),
    ("₄", "_4"),
    ("₅", "_5"),
    ("₆", "_6"),
    ("₇", "_7"),
    ("₈", "_8"),
    ("₉", "_9"),
    // superscript digits
    ("⁰", "_0"),
    ("¹", "_1"),
    ("²", "_2"),
    ("³", "_3"),
    ("⁴", "_4"),
    ("⁵", "_5"),
    ("⁶", "_6"),
    ("⁷", "_7"),
    ("⁸", "_8"),
    ("⁹", "_9"),
    // comparison / arithmetic
    ("±", " plus/minus "),
    ("≤", " less than or equal to "),
    ("≥", " greater than or equal to "),
    ("×", "x"),
    ("½", "1/2"),
    ("→", "->"),
    // dashes
    ("\u{2010}", "-"),
    ("\u{2011}", "-"),
    ("\u{2012}", "-"),
    ("\u{2013}", "-"),
    ("\u{2014}", "-"),
    ("\u{2212}", "-"),
    // quotes
    ("\u{2018}", "'"),
    ("\u{2019}", "'"),
    ("\u{201c}", "\""),
    ("\u{201d}", "\""),
    ("…", "..."),
    // units and nomenclature
    ("µ", "u"),
    ("μ", "u"),
    ("α", "alpha"),
    ("β", "beta"),
    ("γ", "gamma"),
    ("δ", "delta"),
    ("κ", "kappa"),
    ("λ", "lambda"),
    // trademarks and bullets
    ("®", ""),
    ("™", ""),
    ("©", ""),
    ("•", " "),
];

/// Counts symbols that fell through the table, for extending it later.
#[derive(Debug, Default, Clone)]
pub struct GapLog {
    counts: BTreeMap<char, usize>,
}

impl GapLog {
    pub fn record(&mut self, symbol: char) {
        let count = self.counts.entry(symbol).or_insert(0);
        if *count == 0 {
            warn!("Unmapped symbol {:?} (U+{:04X}) passed through", symbol, symbol as u32);
        } else {
            debug!("Unmapped symbol {:?} seen again", symbol);
        }
        *count += 1;
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = (char, usize)> + '_ {
        self.counts.iter().map(|(c, n)| (*c, *n))
    }
}

/// Apply the symbol table; anything non-ASCII and non-alphabetic that survives is a gap.
pub fn substitute(text: &str, gaps: &mut GapLog) -> String {
    let out = replace(text);
    for c in out.chars() {
        if is_gap(c) {
            gaps.record(c);
        }
    }
    out
}

/// Apply the symbol table only.
pub fn replace(text: &str) -> String {
    let mut out = text.to_string();
    for (pattern, replacement) in SYMBOL_TABLE {
        if out.contains(pattern) {
            out = out.replace(pattern, replacement);
        }
    }
    out
}

fn is_gap(c: char) -> bool {
    !c.is_ascii() && !c.is_alphabetic() && !c.is_whitespace()
}
