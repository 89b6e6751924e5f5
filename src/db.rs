use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::catalog::CatalogEntry;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pages (
            id             INTEGER PRIMARY KEY,
            catalog_number TEXT NOT NULL,
            name           TEXT NOT NULL,
            url            TEXT NOT NULL,
            visited        BOOLEAN NOT NULL DEFAULT 0,
            visited_at     TEXT,
            created_at     TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(name, url)
        );
        CREATE INDEX IF NOT EXISTS idx_pages_visited ON pages(visited);
        CREATE INDEX IF NOT EXISTS idx_pages_catalog ON pages(catalog_number);

        CREATE TABLE IF NOT EXISTS page_data (
            id             INTEGER PRIMARY KEY,
            page_id        INTEGER NOT NULL REFERENCES pages(id),
            catalog_number TEXT NOT NULL,
            url            TEXT NOT NULL,
            markup         TEXT,
            status         INTEGER,
            error          TEXT,
            latency_ms     INTEGER,
            fetched_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_page_data_catalog ON page_data(catalog_number);
        ",
    )?;
    Ok(())
}

// ── Queue ──

/// Queue listing entries in order. Re-running with the same listing is a no-op.
pub fn insert_entries(conn: &Connection, entries: &[CatalogEntry]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt =
            tx.prepare("INSERT OR IGNORE INTO pages (catalog_number, name, url) VALUES (?1, ?2, ?3)")?;
        for e in entries {
            count += stmt.execute(rusqlite::params![e.catalog_number, e.name, e.url])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

fn row_to_entry(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<CatalogEntry> {
    Ok(CatalogEntry {
        catalog_number: row.get(offset)?,
        name: row.get(offset + 1)?,
        url: row.get(offset + 2)?,
    })
}

/// Entries that have never been fetched, in listing order.
pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<(i64, CatalogEntry)>> {
    let sql = match limit {
        Some(n) => format!(
            "SELECT id, catalog_number, name, url FROM pages WHERE visited = 0 ORDER BY id LIMIT {}",
            n
        ),
        None => "SELECT id, catalog_number, name, url FROM pages WHERE visited = 0 ORDER BY id".to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row_to_entry(row, 1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every queued entry in listing order, for the processing pass.
pub fn fetch_queue(conn: &Connection, limit: Option<usize>) -> Result<Vec<CatalogEntry>> {
    let sql = format!(
        "SELECT catalog_number, name, url FROM pages ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| row_to_entry(row, 0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Unvisit entries whose latest fetch failed so the next `fetch` retries them.
pub fn requeue_failed(conn: &Connection) -> Result<usize> {
    let n = conn.execute(
        "UPDATE pages SET visited = 0, visited_at = NULL
         WHERE visited = 1 AND id IN (
             SELECT pd.page_id FROM page_data pd
             WHERE pd.id = (SELECT MAX(id) FROM page_data WHERE page_id = pd.page_id)
               AND (pd.markup IS NULL OR pd.error IS NOT NULL)
         )",
        [],
    )?;
    Ok(n)
}

// ── Page cache ──

pub struct FetchRow {
    pub page_id: i64,
    pub catalog_number: String,
    pub url: String,
    pub markup: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

/// Persist one fetch attempt and mark its queue row visited.
pub fn save_fetch(
    insert: &mut rusqlite::Statement,
    update: &mut rusqlite::Statement,
    row: &FetchRow,
) -> Result<()> {
    insert.execute(rusqlite::params![
        row.page_id, row.catalog_number, row.url, row.markup, row.status, row.error, row.latency_ms,
    ])?;
    update.execute(rusqlite::params![row.page_id])?;
    Ok(())
}

pub const INSERT_FETCH_SQL: &str =
    "INSERT INTO page_data (page_id, catalog_number, url, markup, status, error, latency_ms)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";
pub const MARK_VISITED_SQL: &str = "UPDATE pages SET visited = 1, visited_at = datetime('now') WHERE id = ?1";

pub struct CachedPage {
    pub markup: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
}

/// Most recent fetch attempt for a catalog number, if any.
pub fn latest_page(conn: &Connection, catalog_number: &str) -> Result<Option<CachedPage>> {
    let page = conn
        .query_row(
            "SELECT markup, status, error FROM page_data
             WHERE catalog_number = ?1 ORDER BY id DESC LIMIT 1",
            [catalog_number],
            |row| {
                Ok(CachedPage {
                    markup: row.get(0)?,
                    status: row.get(1)?,
                    error: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(page)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub fetched: usize,
    pub errors: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM pages", [], |r| r.get(0))?;
    let visited: usize =
        conn.query_row("SELECT COUNT(*) FROM pages WHERE visited = 1", [], |r| r.get(0))?;
    let fetched: usize = conn.query_row(
        "SELECT COUNT(DISTINCT catalog_number) FROM page_data WHERE markup IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let errors: usize = conn.query_row(
        "SELECT COUNT(*) FROM page_data WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        total,
        visited,
        unvisited: total - visited,
        fetched,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(catalog: &str, name: &str) -> CatalogEntry {
        CatalogEntry {
            catalog_number: catalog.to_string(),
            name: name.to_string(),
            url: format!("https://www.atcc.org/products/{}", catalog.to_lowercase()),
        }
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn queue_keeps_order_and_ignores_reinserts() {
        let conn = memory_db();
        let entries = vec![entry("CCL-2", "HeLa"), entry("CRL-1658", "NIH/3T3"), entry("CCL-2", "HeLa S3")];
        assert_eq!(insert_entries(&conn, &entries).unwrap(), 3);
        assert_eq!(insert_entries(&conn, &entries).unwrap(), 0);

        let queue = fetch_queue(&conn, None).unwrap();
        assert_eq!(queue, entries);
        assert_eq!(fetch_unvisited(&conn, Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn fetch_rows_feed_the_cache() {
        let conn = memory_db();
        insert_entries(&conn, &[entry("CCL-2", "HeLa")]).unwrap();
        let (page_id, e) = fetch_unvisited(&conn, None).unwrap().remove(0);

        let mut insert = conn.prepare(INSERT_FETCH_SQL).unwrap();
        let mut update = conn.prepare(MARK_VISITED_SQL).unwrap();
        save_fetch(
            &mut insert,
            &mut update,
            &FetchRow {
                page_id,
                catalog_number: e.catalog_number.clone(),
                url: e.url.clone(),
                markup: None,
                status: Some(503),
                error: Some("HTTP 503".into()),
                latency_ms: Some(12),
            },
        )
        .unwrap();
        assert!(fetch_unvisited(&conn, None).unwrap().is_empty());
        assert_eq!(requeue_failed(&conn).unwrap(), 1);

        save_fetch(
            &mut insert,
            &mut update,
            &FetchRow {
                page_id,
                catalog_number: e.catalog_number.clone(),
                url: e.url,
                markup: Some("<h1>HeLa</h1>".into()),
                status: Some(200),
                error: None,
                latency_ms: Some(40),
            },
        )
        .unwrap();
        let page = latest_page(&conn, "CCL-2").unwrap().unwrap();
        assert_eq!(page.markup.as_deref(), Some("<h1>HeLa</h1>"));
        assert!(latest_page(&conn, "CRL-1658").unwrap().is_none());

        let stats = get_stats(&conn).unwrap();
        assert_eq!((stats.total, stats.visited, stats.fetched, stats.errors), (1, 1, 1, 1));
    }
}
