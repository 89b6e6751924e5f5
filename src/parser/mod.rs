pub mod extract;
pub mod procedure;
pub mod sections;
pub mod text;

use scraper::Html;
use tracing::{debug, warn};

use crate::catalog::CatalogEntry;
use crate::error::ParseError;
use crate::schema::{Field, RawFieldMap, RawValue};

/// Markup → loosely-typed fields. Name and catalog number anchors are required;
/// every other field is optional.
pub fn parse_entry(entry: &CatalogEntry, markup: &str) -> Result<RawFieldMap, ParseError> {
    let doc = Html::parse_document(markup);
    let sections = sections::labeled_sections(&doc);

    let name = sections::product_name(&doc)
        .ok_or_else(|| ParseError::new(&entry.catalog_number, "missing product name"))?;
    let catalog_number = sections::catalog_number(&doc, &sections)
        .ok_or_else(|| ParseError::new(&entry.catalog_number, "missing catalog number"))?;
    if catalog_number != entry.catalog_number {
        warn!(
            "{}: page reports catalog number {} (listing URL {})",
            entry.catalog_number, catalog_number, entry.url
        );
    }

    let mut fields = extract::extract_fields(&sections);
    if let Some(price) = extract::price::extract_price(&doc) {
        fields.insert(Field::Price, RawValue::Number(price));
    }
    let images = extract::images::extract_images(&doc);
    if !images.is_empty() {
        fields.insert(Field::Images, RawValue::Pairs(images));
    }

    debug!("{}: {} sections, {} fields", entry.catalog_number, sections.len(), fields.len());
    Ok(RawFieldMap {
        name,
        catalog_number,
        fields,
    })
}
