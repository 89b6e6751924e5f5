use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assemble::Assembler;
use crate::catalog::CatalogEntry;
use crate::clean::{self, GapLog};
use crate::error::{ExportError, SkipReason};
use crate::export::Exporter;
use crate::parser;
use crate::provider::{ContentProvider, Fetched};

/// An entry that produced no record this run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkipEvent {
    pub catalog_number: String,
    pub display_name: String,
    pub url: String,
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub processed: usize,
    pub resumed: usize,
    pub skipped: Vec<SkipEvent>,
    pub gaps: GapLog,
    pub cancelled: bool,
}

impl RunReport {
    pub fn duplicates(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| matches!(s.reason, SkipReason::Duplicate { .. }))
            .count()
    }

    /// Skip counts keyed by reason kind.
    pub fn skipped_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.skipped {
            let kind = match s.reason {
                SkipReason::Unavailable(_) => "unavailable",
                SkipReason::Parse(_) => "parse",
                SkipReason::Duplicate { .. } => "duplicate",
                SkipReason::Resumed => "resumed",
            };
            *counts.entry(kind).or_default() += 1;
        }
        counts
    }

    pub fn print(&self) {
        println!(
            "Processed {} entries, resumed {}, skipped {}.",
            self.processed,
            self.resumed,
            self.skipped.len()
        );
        for (kind, n) in self.skipped_by_kind() {
            println!("  {:<12} {}", kind, n);
        }
        if !self.gaps.is_empty() {
            let symbols: Vec<String> = self
                .gaps
                .symbols()
                .map(|(c, n)| format!("{:?} (U+{:04X}) x{}", c, c as u32, n))
                .collect();
            println!("Unmapped symbols ({} occurrences): {}", self.gaps.total(), symbols.join(", "));
        }
        if self.cancelled {
            println!("Run was interrupted; re-run to continue.");
        }
    }
}

/// Push every entry through provider → parser → cleaner → assembler →
/// exporter, one at a time. Only artifact I/O failures abort the run.
pub fn run(
    entries: &[CatalogEntry],
    provider: &dyn ContentProvider,
    assembler: &mut Assembler,
    exporter: &mut Exporter,
    cancel: &AtomicBool,
) -> Result<RunReport, ExportError> {
    let mut report = RunReport::default();

    let pb = ProgressBar::new(entries.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})") {
        pb.set_style(style.progress_chars("=> "));
    }

    for entry in entries {
        if cancel.load(Ordering::SeqCst) {
            warn!("Cancelled; stopping before {}", entry.catalog_number);
            report.cancelled = true;
            break;
        }

        match process_entry(entry, provider, assembler, exporter, &mut report.gaps)? {
            Outcome::Written => report.processed += 1,
            Outcome::Skipped(SkipReason::Resumed) => {
                debug!("{} already exported", entry.catalog_number);
                report.resumed += 1;
            }
            Outcome::Skipped(reason) => {
                warn!("Skipping {} ({}): {}", entry.catalog_number, entry.name, reason);
                report.skipped.push(SkipEvent {
                    catalog_number: entry.catalog_number.clone(),
                    display_name: entry.name.clone(),
                    url: entry.url.clone(),
                    reason,
                });
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    exporter.flush()?;
    exporter.write_skip_log(&report.skipped)?;
    info!(
        "Run finished: {} processed, {} resumed, {} skipped ({} duplicates), {} unmapped symbols",
        report.processed,
        report.resumed,
        report.skipped.len(),
        report.duplicates(),
        report.gaps.total()
    );
    Ok(report)
}

enum Outcome {
    Written,
    Skipped(SkipReason),
}

fn process_entry(
    entry: &CatalogEntry,
    provider: &dyn ContentProvider,
    assembler: &mut Assembler,
    exporter: &mut Exporter,
    gaps: &mut GapLog,
) -> Result<Outcome, ExportError> {
    // resumed and duplicate entries are never fetched
    if let Some(reason) = assembler.precheck(entry) {
        return Ok(Outcome::Skipped(reason));
    }

    let markup = match provider.fetch(entry) {
        Fetched::Markup(m) => m,
        Fetched::Unavailable(why) => return Ok(Outcome::Skipped(SkipReason::Unavailable(why))),
    };

    let raw = match parser::parse_entry(entry, &markup) {
        Ok(raw) => raw,
        Err(e) => return Ok(Outcome::Skipped(e.into())),
    };

    let normalized = clean::normalize(raw, gaps);
    let assembled = match assembler.assemble(entry, normalized) {
        Ok(a) => a,
        Err(reason) => return Ok(Outcome::Skipped(reason)),
    };

    let path = exporter.write_entry(&assembled)?;
    debug!("#{} {} → {}", assembled.record.id, assembled.key, path.display());
    Ok(Outcome::Written)
}
