use scraper::{ElementRef, Node};

/// Elements that start a new line in the extracted text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "ol", "ul", "br", "tr", "dt", "dd", "h1", "h2", "h3", "h4", "h5", "h6",
    "section", "article", "table",
];

/// Visible text of an element, one line per block element. Whitespace inside
/// text nodes is collapsed so only structural breaks produce newlines.
/// `<sub>` content is prefixed with `_`, `<sup>` with `^`.
pub fn element_text(el: ElementRef) -> String {
    element_text_without(el, &[])
}

/// Like `element_text`, skipping any subtree whose tag is in `skip`.
pub fn element_text_without(el: ElementRef, skip: &[&str]) -> String {
    let mut raw = String::new();
    walk(el, skip, &mut raw);
    raw.split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn walk(el: ElementRef, skip: &[&str], out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => push_collapsed(out, t),
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else { continue };
                let tag = child_el.value().name();
                let is_block = BLOCK_TAGS.contains(&tag);
                if skip.contains(&tag) || matches!(tag, "script" | "style") {
                    // a dropped block still separates its neighbours
                    if is_block {
                        out.push('\n');
                    }
                    continue;
                }
                if is_block {
                    out.push('\n');
                }
                match tag {
                    "sub" => out.push('_'),
                    "sup" => out.push('^'),
                    _ => {}
                }
                walk(child_el, skip, out);
                if is_block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn push_collapsed(out: &mut String, text: &str) {
    let mut last_space = out.ends_with(' ') || out.ends_with('\n');
    for c in text.chars() {
        if c.is_whitespace() && c != '\u{00a0}' {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(c);
            last_space = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn first(html: &str, sel: &str) -> String {
        let doc = Html::parse_fragment(html);
        let sel = Selector::parse(sel).unwrap();
        let el = doc.select(&sel).next().unwrap();
        element_text(el)
    }

    #[test]
    fn blocks_become_lines() {
        let t = first("<div id=x><p>Base medium:\n  EMEM</p><ul><li>FBS 10%</li><li>L-glutamine</li></ul></div>", "#x");
        assert_eq!(t, "Base medium: EMEM\nFBS 10%\nL-glutamine");
    }

    #[test]
    fn sub_and_sup_are_marked() {
        let t = first("<span id=x>5% CO<sub>2</sub>, 10<sup>6</sup> cells</span>", "#x");
        assert_eq!(t, "5% CO_2, 10^6 cells");
    }

    #[test]
    fn skipped_subtrees_are_dropped() {
        let doc = Html::parse_fragment("<div id=x>Intro text<ol><li>Thaw</li></ol>Outro</div>");
        let sel = Selector::parse("#x").unwrap();
        let el = doc.select(&sel).next().unwrap();
        assert_eq!(element_text_without(el, &["ol"]), "Intro text\nOutro");
    }

    #[test]
    fn skipped_inline_subtree_leaves_no_break() {
        let doc = Html::parse_fragment("<p id=x>Keep <span>drop</span>this</p>");
        let sel = Selector::parse("#x").unwrap();
        let el = doc.select(&sel).next().unwrap();
        assert_eq!(element_text_without(el, &["span"]), "Keep this");
    }
}
