/// Tokens that end with a period but do not end a sentence (compared lowercase,
/// without the trailing period).
const ABBREVIATIONS: &[&str] = &[
    "e.g", "i.e", "eg", "ie", "etc", "approx", "ca", "cf", "vs", "viz", "al", "fig", "figs",
    "vol", "wt", "ref", "refs", "cat", "dr", "mr", "ms", "st", "inc", "ltd", "co", "sp", "spp",
    "var", "ea", "resp", "incl",
];

/// Unit words and numbering abbreviations. Protocol sentences routinely end on
/// them ("for 5 min."), so they only hold a sentence together before a digit
/// ("No. 30-2003").
const BEFORE_DIGIT: &[&str] = &["no", "nos", "min", "max", "sec", "hr", "hrs", "temp"];

const CLOSERS: &[char] = &['"', '\'', ')', ']'];

/// Split prose into sentences. A terminator (`.`, `!`, `?`) only ends a
/// sentence when followed by whitespace and an uppercase letter, digit, or
/// opening bracket/quote, and (for `.`) when the preceding token is not a known
/// abbreviation. Decimals like `2.0` never split because no whitespace follows.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let (_, c) = chars[i];
        if !matches!(c, '.' | '!' | '?') {
            i += 1;
            continue;
        }

        // absorb runs like "?!" or "..." and trailing closers like .")
        let mut end = i + 1;
        while end < chars.len() && (matches!(chars[end].1, '.' | '!' | '?') || CLOSERS.contains(&chars[end].1)) {
            end += 1;
        }

        let followed_by_space = end < chars.len() && chars[end].1.is_whitespace();
        if !followed_by_space {
            i = end;
            continue;
        }

        let next = chars[end..].iter().map(|(_, ch)| *ch).find(|ch| !ch.is_whitespace());
        let opens_sentence = next.is_some_and(|ch| {
            ch.is_uppercase() || ch.is_ascii_digit() || matches!(ch, '(' | '[' | '"' | '\'')
        });

        let before_digit = next.is_some_and(|ch| ch.is_ascii_digit());
        let held = c == '.' && ends_with_abbreviation(&text[start..chars[i].0], before_digit);
        if opens_sentence && !held {
            let byte_end = if end < chars.len() { chars[end].0 } else { text.len() };
            push_trimmed(&mut sentences, &text[start..byte_end]);
            start = byte_end;
        }
        i = end;
    }

    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn ends_with_abbreviation(before_period: &str, before_digit: bool) -> bool {
    let token = before_period
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or("")
        .trim_start_matches(['(', '[', '"', '\''])
        .to_lowercase();
    let token = token.as_str();
    !token.is_empty() && (ABBREVIATIONS.contains(&token) || (before_digit && BEFORE_DIGIT.contains(&token)))
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let s = s.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
}
