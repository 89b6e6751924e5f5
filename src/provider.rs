use std::path::PathBuf;

use rusqlite::Connection;
use tracing::warn;

use crate::catalog::CatalogEntry;
use crate::db;

/// Outcome of asking a provider for an entry's markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Markup(String),
    /// Transient or missing; the entry is retried on the next run.
    Unavailable(String),
}

/// Source of rendered detail-page markup.
pub trait ContentProvider {
    fn fetch(&self, entry: &CatalogEntry) -> Fetched;
}

/// Markup previously stored by the `fetch` command.
pub struct PageStore<'a> {
    conn: &'a Connection,
}

impl<'a> PageStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        PageStore { conn }
    }
}

impl ContentProvider for PageStore<'_> {
    fn fetch(&self, entry: &CatalogEntry) -> Fetched {
        match db::latest_page(self.conn, &entry.catalog_number) {
            Ok(Some(page)) => match (page.markup, page.error, page.status) {
                (_, Some(err), _) => Fetched::Unavailable(err),
                (Some(_), None, Some(status)) if !(200..300).contains(&status) => {
                    Fetched::Unavailable(format!("HTTP {}", status))
                }
                (Some(markup), None, _) => Fetched::Markup(markup),
                (None, None, _) => Fetched::Unavailable("empty response".to_string()),
            },
            Ok(None) => Fetched::Unavailable("not fetched yet".to_string()),
            Err(e) => {
                warn!("Page cache lookup failed for {}: {:#}", entry.catalog_number, e);
                Fetched::Unavailable(format!("page cache error: {}", e))
            }
        }
    }
}

/// Saved pages on disk, one `<CATALOG>.html` per entry.
pub struct FixtureDir {
    dir: PathBuf,
}

impl FixtureDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FixtureDir { dir: dir.into() }
    }
}

impl ContentProvider for FixtureDir {
    fn fetch(&self, entry: &CatalogEntry) -> Fetched {
        let candidates = [
            self.dir.join(format!("{}.html", entry.catalog_number)),
            self.dir.join(format!("{}.html", entry.catalog_number.to_lowercase())),
        ];
        for path in &candidates {
            match std::fs::read_to_string(path) {
                Ok(markup) => return Fetched::Markup(markup),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Fetched::Unavailable(format!("{}: {}", path.display(), e)),
            }
        }
        Fetched::Unavailable(format!("no saved page in {}", self.dir.display()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn entry(catalog: &str) -> CatalogEntry {
        CatalogEntry::from_listing("x", &format!("https://www.atcc.org/products/{}", catalog)).unwrap()
    }

    #[test]
    fn fixture_dir_reads_lowercase_files() {
        let provider = FixtureDir::new("tests/fixtures");
        assert!(matches!(provider.fetch(&entry("ccl-2")), Fetched::Markup(m) if m.contains("HeLa")));
        assert!(matches!(provider.fetch(&entry("htb-999")), Fetched::Unavailable(_)));
    }

    #[test]
    fn page_store_maps_cache_rows() {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let hela = entry("ccl-2");
        let mouse = entry("crl-1658");
        db::insert_entries(&conn, &[hela.clone(), mouse.clone()]).unwrap();
        let store = PageStore::new(&conn);
        assert_eq!(store.fetch(&hela), Fetched::Unavailable("not fetched yet".into()));

        let queue = db::fetch_unvisited(&conn, None).unwrap();
        let mut insert = conn.prepare(db::INSERT_FETCH_SQL).unwrap();
        let mut update = conn.prepare(db::MARK_VISITED_SQL).unwrap();
        for (page_id, e) in queue {
            let (markup, status) = if e.catalog_number == "CCL-2" {
                (Some("<h1>HeLa</h1>".to_string()), Some(200))
            } else {
                (Some("gone".to_string()), Some(404))
            };
            db::save_fetch(
                &mut insert,
                &mut update,
                &db::FetchRow {
                    page_id,
                    catalog_number: e.catalog_number,
                    url: e.url,
                    markup,
                    status,
                    error: None,
                    latency_ms: None,
                },
            )
            .unwrap();
        }

        assert_eq!(store.fetch(&hela), Fetched::Markup("<h1>HeLa</h1>".into()));
        assert_eq!(store.fetch(&mouse), Fetched::Unavailable("HTTP 404".into()));
    }
}
