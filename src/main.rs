mod assemble;
mod catalog;
mod clean;
mod config;
mod db;
mod error;
mod export;
mod fetch;
mod parser;
mod pipeline;
mod provider;
mod schema;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::warn;

use crate::assemble::{Assembler, RunLedger};
use crate::catalog::{normalize_catalog_number, CatalogEntry};
use crate::config::Paths;
use crate::export::Exporter;
use crate::provider::{ContentProvider, Fetched, FixtureDir, PageStore};

#[derive(Parser)]
#[command(name = "atcc_scraper", about = "ATCC cell-line protocol extraction and normalization")]
struct Cli {
    /// Page cache database
    #[arg(long, global = true, default_value = config::DB_PATH)]
    db: PathBuf,
    /// Root for output artifacts (default: output_data/)
    #[arg(long, global = true)]
    out: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a catalog listing (JSON `{name: url}` or `[{name, url}]`) into the queue
    Init {
        #[arg(long)]
        links: PathBuf,
    },
    /// Fetch unvisited detail pages into the page cache
    Fetch {
        /// Max pages to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Re-queue pages whose last fetch failed before fetching
        #[arg(long)]
        retry_failed: bool,
    },
    /// Parse, normalize and export every queued entry
    Process {
        /// Read `<CATALOG>.html` files from this directory instead of the page cache
        #[arg(long)]
        html_dir: Option<PathBuf>,
        /// Rewrite the aggregate file after this many new records
        #[arg(long, default_value_t = config::DEFAULT_FLUSH_EVERY)]
        flush_every: usize,
        /// Max queue entries to process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fetch + process in one go
    Run {
        /// Max pages to fetch
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = config::DEFAULT_FLUSH_EVERY)]
        flush_every: usize,
    },
    /// Rebuild the aggregate file from per-entry files
    Merge,
    /// Parse one entry and print its record without writing anything
    Show {
        catalog_number: String,
        /// Fetch the page live instead of reading the cache
        #[arg(long)]
        live: bool,
    },
    /// Queue, cache and artifact counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut paths = match &cli.out {
        Some(out) => Paths::under(out),
        None => Paths::default(),
    };
    paths.db = cli.db.clone();

    let result = match cli.command {
        Commands::Init { links } => {
            let conn = db::connect(&paths.db)?;
            db::init_schema(&conn)?;
            let entries = catalog::load_listing(&links)?;
            let inserted = db::insert_entries(&conn, &entries)?;
            println!("Queued {} new entries ({} in listing)", inserted, entries.len());
            Ok(())
        }
        Commands::Fetch { limit, retry_failed } => {
            let conn = db::connect(&paths.db)?;
            db::init_schema(&conn)?;
            if retry_failed {
                let n = db::requeue_failed(&conn)?;
                println!("Re-queued {} failed pages", n);
            }
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages. Run 'init' first or all pages are fetched.");
                return Ok(());
            }
            println!("Fetching {} pages (streaming to cache)...", pages.len());
            let stats = fetch::fetch_pages_streaming(&conn, pages).await?;
            println!("Done: {} fetched ({} ok, {} errors).", stats.total, stats.ok, stats.errors);
            Ok(())
        }
        Commands::Process {
            html_dir,
            flush_every,
            limit,
        } => {
            let conn = db::connect(&paths.db)?;
            db::init_schema(&conn)?;
            let queue = db::fetch_queue(&conn, limit)?;
            if queue.is_empty() {
                println!("Queue is empty. Run 'init' first.");
                return Ok(());
            }
            let report = match html_dir {
                Some(dir) => process_queue(&queue, &FixtureDir::new(dir), &paths, flush_every)?,
                None => process_queue(&queue, &PageStore::new(&conn), &paths, flush_every)?,
            };
            report.print();
            Ok(())
        }
        Commands::Run { limit, flush_every } => {
            let conn = db::connect(&paths.db)?;
            db::init_schema(&conn)?;

            // Phase 1: fetch into the cache
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages; processing cached pages only.");
            } else {
                let t_fetch = Instant::now();
                println!("Pipeline: fetching {} pages...", pages.len());
                let stats = fetch::fetch_pages_streaming(&conn, pages).await?;
                println!(
                    "Fetched {} pages ({} ok, {} errors) in {:.1}s",
                    stats.total,
                    stats.ok,
                    stats.errors,
                    t_fetch.elapsed().as_secs_f64()
                );
            }

            // Phase 2: process the whole queue; exported entries resume instantly
            let queue = db::fetch_queue(&conn, None)?;
            if queue.is_empty() {
                println!("Queue is empty. Run 'init' first.");
                return Ok(());
            }
            let report = process_queue(&queue, &PageStore::new(&conn), &paths, flush_every)?;
            report.print();
            Ok(())
        }
        Commands::Merge => {
            let n = export::merge(&paths)?;
            println!("Merged {} records into {}", n, paths.merged_file.display());
            Ok(())
        }
        Commands::Show { catalog_number, live } => show(&paths, &catalog_number, live).await,
        Commands::Stats => {
            let conn = db::connect(&paths.db)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            let exported = export::scan(&paths.entry_dir)?.len();
            println!("Queued:    {}", s.total);
            println!("Visited:   {}", s.visited);
            println!("Unvisited: {}", s.unvisited);
            println!("Cached:    {}", s.fetched);
            println!("Errors:    {}", s.errors);
            println!("Exported:  {}", exported);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Stop flag flipped by Ctrl-C; the pipeline checks it between entries.
fn cancel_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing the current entry");
            handle.store(true, Ordering::SeqCst);
        }
    });
    flag
}

fn process_queue(
    queue: &[CatalogEntry],
    provider: &dyn ContentProvider,
    paths: &Paths,
    flush_every: usize,
) -> anyhow::Result<pipeline::RunReport> {
    let (mut exporter, ledger) = Exporter::open(paths.clone(), flush_every)?;
    let mut assembler = Assembler::new(ledger);
    let cancel = cancel_flag();
    println!(
        "Processing {} entries ({} already exported)...",
        queue.len(),
        assembler.ledger().resumed_len()
    );
    let report = pipeline::run(queue, provider, &mut assembler, &mut exporter, &cancel)?;
    if !exporter.is_empty() {
        println!("Aggregate holds {} records: {}", exporter.len(), paths.merged_file.display());
    }
    Ok(report)
}

async fn show(paths: &Paths, catalog_number: &str, live: bool) -> anyhow::Result<()> {
    let wanted = normalize_catalog_number(catalog_number);
    let conn = db::connect(&paths.db)?;
    db::init_schema(&conn)?;

    let entry = db::fetch_queue(&conn, None)?
        .into_iter()
        .find(|e| e.catalog_number == wanted)
        .unwrap_or_else(|| CatalogEntry {
            url: format!("{}/products/{}", config::base_url(), wanted.to_lowercase()),
            name: wanted.clone(),
            catalog_number: wanted.clone(),
        });

    let markup = if live {
        fetch::fetch_single_page(&entry.url).await?
    } else {
        match PageStore::new(&conn).fetch(&entry) {
            Fetched::Markup(m) => m,
            Fetched::Unavailable(why) => bail!("{} is not cached ({}); try --live", wanted, why),
        }
    };

    let raw = parser::parse_entry(&entry, &markup)?;
    let mut gaps = clean::GapLog::default();
    let normalized = clean::normalize(raw, &mut gaps);
    let assembled = Assembler::new(RunLedger::new())
        .assemble(&entry, normalized)
        .map_err(|reason| anyhow::anyhow!("{}: {}", wanted, reason))?;

    let mut single = BTreeMap::new();
    single.insert(assembled.key.as_str(), &assembled.record);
    let json = export::to_pretty_json(&single, &assembled.key)?;
    println!("{}", String::from_utf8(json).context("record JSON is not UTF-8")?.trim_end());
    if !gaps.is_empty() {
        println!("\n{} unmapped symbol occurrence(s)", gaps.total());
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
