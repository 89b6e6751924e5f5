use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// One cell line as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub catalog_number: String,
    pub name: String,
    pub url: String,
}

impl CatalogEntry {
    /// Catalog number is taken from the detail URL (`/products/crl-1658` → `CRL-1658`).
    pub fn from_listing(name: &str, url: &str) -> Option<Self> {
        Some(CatalogEntry {
            catalog_number: catalog_number_from_url(url)?,
            name: name.trim().to_string(),
            url: url.trim().to_string(),
        })
    }
}

/// Identity key for dedup: trimmed and uppercased.
pub fn normalize_catalog_number(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub fn catalog_number_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    if last.is_empty() || last.contains(':') {
        return None;
    }
    Some(normalize_catalog_number(last))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Listing {
    /// `{ "HeLa": "https://www.atcc.org/products/ccl-2", ... }` (insertion order kept)
    Map(serde_json::Map<String, serde_json::Value>),
    List(Vec<ListingItem>),
}

#[derive(Deserialize)]
struct ListingItem {
    name: String,
    url: String,
}

/// Load a catalog listing from JSON, in file order. Items without a usable URL are skipped.
pub fn load_listing(path: &Path) -> Result<Vec<CatalogEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read listing {}", path.display()))?;
    parse_listing(&text).with_context(|| format!("Invalid listing {}", path.display()))
}

pub fn parse_listing(json: &str) -> Result<Vec<CatalogEntry>> {
    let pairs: Vec<(String, String)> = match serde_json::from_str::<Listing>(json)? {
        Listing::Map(map) => map
            .into_iter()
            .filter_map(|(name, url)| url.as_str().map(|u| (name, u.to_string())))
            .collect(),
        Listing::List(items) => items.into_iter().map(|i| (i.name, i.url)).collect(),
    };

    let mut entries = Vec::with_capacity(pairs.len());
    for (name, url) in pairs {
        match CatalogEntry::from_listing(&name, &url) {
            Some(entry) => entries.push(entry),
            None => tracing::warn!("Skipping listing item {:?}: no catalog number in {:?}", name, url),
        }
    }
    if entries.is_empty() {
        bail!("listing contains no usable entries");
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_number_from_product_url() {
        assert_eq!(
            catalog_number_from_url("https://www.atcc.org/products/crl-1658").as_deref(),
            Some("CRL-1658")
        );
        assert_eq!(
            catalog_number_from_url("https://www.atcc.org/products/ccl-2/?tab=1#x").as_deref(),
            Some("CCL-2")
        );
        assert_eq!(catalog_number_from_url("https://"), None);
    }

    #[test]
    fn map_listing_keeps_file_order() {
        let json = r#"{
            "Zeta cells": "https://www.atcc.org/products/crl-9",
            "Alpha cells": "https://www.atcc.org/products/ccl-1",
            "Broken": 42
        }"#;
        let entries = parse_listing(json).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Zeta cells", "Alpha cells"]);
        assert_eq!(entries[0].catalog_number, "CRL-9");
    }

    #[test]
    fn list_listing_allows_repeated_catalog_numbers() {
        let json = r#"[
            {"name": "HeLa", "url": "https://www.atcc.org/products/ccl-2"},
            {"name": "HeLa ", "url": "https://www.atcc.org/products/CCL-2"}
        ]"#;
        let entries = parse_listing(json).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].catalog_number, entries[1].catalog_number);
    }

    #[test]
    fn empty_listing_is_an_error() {
        assert!(parse_listing("{}").is_err());
    }
}
