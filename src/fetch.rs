use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::catalog::CatalogEntry;
use crate::config::{BASE_BACKOFF_MS, FETCH_CONCURRENCY, FETCH_TIMEOUT_SECS, MAX_RETRIES};
use crate::db::{self, FetchRow};

const USER_AGENT: &str = concat!("atcc_scraper/", env!("CARGO_PKG_VERSION"));

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()
        .context("Failed to build HTTP client")
}

/// Fetch detail pages concurrently, saving each result to the page cache as it arrives.
pub async fn fetch_pages_streaming(
    conn: &Connection,
    pages: Vec<(i64, CatalogEntry)>,
) -> Result<FetchStats> {
    let client = build_client()?;
    let semaphore = Arc::new(Semaphore::new(FETCH_CONCURRENCY));
    let total = pages.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Workers send results, this task owns the connection and saves them
    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchRow>(FETCH_CONCURRENCY * 2);

    for (page_id, entry) in pages {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else { return };
            let row = fetch_with_retry(&client, page_id, &entry).await;
            let _ = tx.send(row).await;
        });
    }

    // rx closes once every spawned task has dropped its sender
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;

    let mut insert_stmt = conn.prepare(db::INSERT_FETCH_SQL)?;
    let mut update_stmt = conn.prepare(db::MARK_VISITED_SQL)?;

    while let Some(row) = rx.recv().await {
        if row.error.is_some() {
            errors += 1;
        } else {
            ok += 1;
        }
        db::save_fetch(&mut insert_stmt, &mut update_stmt, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} pages ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}

fn is_retryable(status: Option<StatusCode>) -> bool {
    status.is_some_and(|s| s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error())
}

async fn fetch_with_retry(client: &Client, page_id: i64, entry: &CatalogEntry) -> FetchRow {
    let mut attempt = 0;
    loop {
        let (row, status) = fetch_one(client, page_id, entry).await;
        // timeouts and connection resets carry no status and are retried too
        let transient = is_retryable(status) || (status.is_none() && row.error.is_some());

        if !transient || attempt == MAX_RETRIES {
            return row;
        }

        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "Fetch failed for {} (attempt {}/{}), backing off {:.1}s",
            entry.catalog_number,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

async fn fetch_one(client: &Client, page_id: i64, entry: &CatalogEntry) -> (FetchRow, Option<StatusCode>) {
    let start = Instant::now();
    let result = async {
        let resp = client.get(&entry.url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok::<_, reqwest::Error>((status, body))
    }
    .await;
    let latency_ms = Some(start.elapsed().as_millis() as i64);

    let mut row = FetchRow {
        page_id,
        catalog_number: entry.catalog_number.clone(),
        url: entry.url.clone(),
        markup: None,
        status: None,
        error: None,
        latency_ms,
    };

    match result {
        Ok((status, body)) => {
            row.status = Some(status.as_u16() as i32);
            if status.is_success() {
                row.markup = Some(body);
            } else {
                row.error = Some(format!("HTTP {}", status.as_u16()));
            }
            (row, Some(status))
        }
        Err(e) => {
            row.status = e.status().map(|s| s.as_u16() as i32);
            row.error = Some(e.to_string());
            (row, e.status())
        }
    }
}

/// Fetch one detail page directly, bypassing the cache.
pub async fn fetch_single_page(url: &str) -> Result<String> {
    let client = build_client()?;
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Request to {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Bad response from {}", url))?;
    resp.text().await.context("Failed to read response body")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy() {
        assert!(is_retryable(Some(StatusCode::TOO_MANY_REQUESTS)));
        assert!(is_retryable(Some(StatusCode::BAD_GATEWAY)));
        assert!(!is_retryable(Some(StatusCode::NOT_FOUND)));
        assert!(!is_retryable(Some(StatusCode::OK)));
        assert!(!is_retryable(None));
    }
}
