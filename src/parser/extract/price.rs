use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::config::selectors;
use crate::parser::text::element_text;

static PRICE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(selectors::PRICE_CURRENT).unwrap());
// optional sign on either side of the currency: "-$5.00", "$-5.00", "USD 579"
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([-\x{2212}]\s*)?(?:[$€£]|[A-Z]{3})?\s*([-\x{2212}]\s*)?(\d[\d,]*(?:\.\d+)?)").unwrap()
});

/// Current list price from the pricing badge.
pub fn extract_price(doc: &Html) -> Option<f64> {
    doc.select(&PRICE_SEL)
        .map(element_text)
        .find_map(|t| parse_price(&t))
}

/// `"$1,234.00"` → `1234.0`, `"-$5.00"` → `-5.0`. Anything without digits is `None`.
pub fn parse_price(raw: &str) -> Option<f64> {
    let caps = AMOUNT_RE.captures(raw)?;
    let amount: f64 = caps[3].replace(',', "").parse().ok()?;
    let negative = caps.get(1).is_some() || caps.get(2).is_some();
    Some(if negative { -amount } else { amount })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_currency_strings() {
        assert_eq!(parse_price("$1,234.00"), Some(1234.0));
        assert_eq!(parse_price(" USD 579 "), Some(579.0));
        assert_eq!(parse_price("$0.50"), Some(0.5));
        assert_eq!(parse_price("-$5.00"), Some(-5.0));
        assert_eq!(parse_price("$ -12.50"), Some(-12.5));
        assert_eq!(parse_price("Call for pricing"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn reads_current_price_badge() {
        let doc = Html::parse_document(
            r#"<span class="product-pricing__list-price">$700.00</span>
               <span class="product-pricing__current-price">$ 628.00</span>"#,
        );
        assert_eq!(extract_price(&doc), Some(628.0));
    }
}
