use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::config::{self, selectors};

static IMAGE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(selectors::IMAGE_GALLERY).unwrap());

/// Gallery images as `(label, absolute_url)`, in page order. Repeated URLs are skipped.
pub fn extract_images(doc: &Html) -> Vec<(String, String)> {
    extract_images_with_base(doc, &config::base_url())
}

pub fn extract_images_with_base(doc: &Html, base: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for img in doc.select(&IMAGE_SEL) {
        let Some(src) = img.value().attr("src").map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        let url = absolutize(base, src);
        if out.iter().any(|(_, u)| *u == url) {
            continue;
        }
        let label = img
            .value()
            .attr("alt")
            .map(|a| a.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| format!("Image {}", out.len() + 1));
        out.push((label, url));
    }
    out
}

fn absolutize(base: &str, src: &str) -> String {
    if src.starts_with("http://") || src.starts_with("https://") {
        src.to_string()
    } else if let Some(rest) = src.strip_prefix("//") {
        format!("https://{}", rest)
    } else if src.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), src)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gallery_images_are_absolute_and_labelled() {
        let doc = Html::parse_document(
            r#"<div class="modal-image-gallery__open-modal">
                 <img src="/-/media/products/ccl-2-low.jpg" alt="Low density">
               </div>
               <div class="modal-image-gallery__open-modal">
                 <img src="https://cdn.example.org/high.jpg">
               </div>
               <div class="modal-image-gallery__open-modal">
                 <img src="/-/media/products/ccl-2-low.jpg" alt="Duplicate">
               </div>
               <img src="/not-in-gallery.jpg" alt="ignored">"#,
        );
        let images = extract_images_with_base(&doc, "https://www.atcc.org/");
        assert_eq!(
            images,
            vec![
                ("Low density".to_string(), "https://www.atcc.org/-/media/products/ccl-2-low.jpg".to_string()),
                ("Image 2".to_string(), "https://cdn.example.org/high.jpg".to_string()),
            ]
        );
    }

    #[test]
    fn no_gallery_no_images() {
        let doc = Html::parse_document("<p>text</p>");
        assert!(extract_images_with_base(&doc, "https://www.atcc.org").is_empty());
    }
}
