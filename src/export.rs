use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assemble::{Assembled, RunLedger};
use crate::catalog::catalog_number_from_url;
use crate::config::Paths;
use crate::error::ExportError;
use crate::schema::CellRecord;

const TMP_SUFFIX: &str = ".tmp";

/// File name for a record key: path and reserved characters become `_`.
pub fn file_stem(key: &str) -> String {
    let stem: String = key
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let stem = stem.trim_start_matches('.').to_string();
    if stem.is_empty() {
        "entry".to_string()
    } else {
        stem
    }
}

/// Pretty JSON with 4-space indentation and a trailing newline.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T, what: &str) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser).map_err(|source| ExportError::Serialize {
        what: what.to_string(),
        source,
    })?;
    buf.push(b'\n');
    Ok(buf)
}

/// Write via a temp file in the same directory, fsync, verify, rename.
/// Readers see either the old file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(|e| ExportError::io("create directory", dir, e))?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(TMP_SUFFIX);
    let tmp = dir.join(tmp_name);

    let mut file = File::create(&tmp).map_err(|e| ExportError::io("create", &tmp, e))?;
    file.write_all(bytes).map_err(|e| ExportError::io("write", &tmp, e))?;
    file.sync_all().map_err(|e| ExportError::io("sync", &tmp, e))?;
    drop(file);

    let written = fs::metadata(&tmp).map_err(|e| ExportError::io("stat", &tmp, e))?.len();
    if written != bytes.len() as u64 {
        let _ = fs::remove_file(&tmp);
        return Err(ExportError::Incomplete {
            path: tmp,
            written,
            expected: bytes.len() as u64,
        });
    }
    fs::rename(&tmp, path).map_err(|e| ExportError::io("rename", path, e))?;
    Ok(())
}

// ── Resume scan ──

/// One per-entry artifact recovered from disk.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub path: PathBuf,
    pub key: String,
    pub record: CellRecord,
}

fn read_entry_file(path: &Path) -> Result<(String, CellRecord), String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let mut map: BTreeMap<String, CellRecord> = serde_json::from_str(&text).map_err(|e| e.to_string())?;
    if map.len() != 1 {
        return Err(format!("expected one record, found {}", map.len()));
    }
    map.pop_first().ok_or_else(|| "empty artifact".to_string())
}

/// Read every `*.json` artifact in `dir`, sorted by record ID. Leftover temp
/// files are removed; unreadable artifacts are reported and left for
/// reprocessing.
pub fn scan(dir: &Path) -> Result<Vec<StoredRecord>, ExportError> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ExportError::io("read directory", dir, e)),
    };

    let mut out = Vec::new();
    for item in read_dir {
        let item = item.map_err(|e| ExportError::io("read directory", dir, e))?;
        let path = item.path();
        let name = item.file_name().to_string_lossy().into_owned();

        if name.ends_with(TMP_SUFFIX) {
            debug!("Removing interrupted write {}", path.display());
            let _ = fs::remove_file(&path);
            continue;
        }
        if !name.ends_with(".json") || !path.is_file() {
            continue;
        }

        match read_entry_file(&path) {
            Ok((key, record)) => out.push(StoredRecord { path, key, record }),
            Err(reason) => warn!("Ignoring unreadable artifact {}: {}", path.display(), reason),
        }
    }
    out.sort_by(|a, b| a.record.id.cmp(&b.record.id).then_with(|| a.key.cmp(&b.key)));
    Ok(out)
}

/// Ledger identity for a stored record: the listing URL's catalog number,
/// falling back to the record's own.
fn stored_catalog_number(record: &CellRecord) -> String {
    catalog_number_from_url(&record.link).unwrap_or_else(|| record.catalog_number.clone())
}

// ── Exporter ──

/// Writes per-entry artifacts and keeps the aggregate in memory, flushing it
/// every `flush_every` records; callers `flush` once more at the end.
pub struct Exporter {
    paths: Paths,
    aggregate: BTreeMap<String, CellRecord>,
    /// lowercase file stem → key that owns it
    files: HashMap<String, String>,
    pending: usize,
    flush_every: usize,
}

impl Exporter {
    /// Recover prior artifacts and return the exporter with a seeded ledger.
    pub fn open(paths: Paths, flush_every: usize) -> Result<(Self, RunLedger), ExportError> {
        fs::create_dir_all(&paths.entry_dir)
            .map_err(|e| ExportError::io("create directory", &paths.entry_dir, e))?;

        let mut ledger = RunLedger::new();
        let mut aggregate = BTreeMap::new();
        let mut files = HashMap::new();

        for stored in scan(&paths.entry_dir)? {
            let stem = stored
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            ledger.seed(&stored_catalog_number(&stored.record), stored.record.id, &stored.key);
            files.insert(stem, stored.key.clone());
            aggregate.insert(stored.key, stored.record);
        }

        if !aggregate.is_empty() {
            info!(
                "Resuming: {} records on disk, next ID {}",
                aggregate.len(),
                ledger.max_id() + 1
            );
        }

        let exporter = Exporter {
            paths,
            aggregate,
            files,
            pending: 0,
            flush_every: flush_every.max(1),
        };
        Ok((exporter, ledger))
    }

    pub fn len(&self) -> usize {
        self.aggregate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregate.is_empty()
    }

    fn entry_path(&mut self, key: &str, catalog_number: &str) -> PathBuf {
        let mut stem = file_stem(key);
        let taken = |files: &HashMap<String, String>, s: &str| {
            files.get(&s.to_lowercase()).is_some_and(|owner| owner != key)
        };
        if taken(&self.files, &stem) {
            stem = format!("{}_{}", stem, file_stem(catalog_number));
        }
        let mut n = 2;
        let base = stem.clone();
        while taken(&self.files, &stem) {
            stem = format!("{}_{}", base, n);
            n += 1;
        }
        self.files.insert(stem.to_lowercase(), key.to_string());
        self.paths.entry_dir.join(format!("{}.json", stem))
    }

    /// Persist one record. The per-entry artifact is on disk before this returns.
    pub fn write_entry(&mut self, assembled: &Assembled) -> Result<PathBuf, ExportError> {
        let path = self.entry_path(&assembled.key, &assembled.record.catalog_number);
        let mut single = BTreeMap::new();
        single.insert(assembled.key.as_str(), &assembled.record);
        write_atomic(&path, &to_pretty_json(&single, &assembled.key)?)?;

        self.aggregate.insert(assembled.key.clone(), assembled.record.clone());
        self.pending += 1;
        if self.pending >= self.flush_every {
            self.flush()?;
        }
        Ok(path)
    }

    /// Rewrite the aggregate artifact from the in-memory map.
    pub fn flush(&mut self) -> Result<(), ExportError> {
        write_atomic(&self.paths.merged_file, &to_pretty_json(&self.aggregate, "aggregate")?)?;
        debug!("Flushed aggregate with {} records", self.aggregate.len());
        self.pending = 0;
        Ok(())
    }

    pub fn write_skip_log<T: Serialize>(&self, skipped: &[T]) -> Result<(), ExportError> {
        write_skip_log(&self.paths.skip_log, Utc::now(), skipped)
    }
}

#[derive(Serialize)]
struct SkipLog<'a, T> {
    generated_at: DateTime<Utc>,
    count: usize,
    skipped: &'a [T],
}

pub fn write_skip_log<T: Serialize>(
    path: &Path,
    generated_at: DateTime<Utc>,
    skipped: &[T],
) -> Result<(), ExportError> {
    let log = SkipLog {
        generated_at,
        count: skipped.len(),
        skipped,
    };
    write_atomic(path, &to_pretty_json(&log, "skip log")?)
}

/// Rebuild the aggregate from per-entry artifacts alone.
pub fn merge(paths: &Paths) -> Result<usize, ExportError> {
    let stored = scan(&paths.entry_dir)?;
    let mut aggregate = BTreeMap::new();
    for s in stored {
        if let Some(prev) = aggregate.insert(s.key.clone(), s.record) {
            warn!("Key {:?} appears in more than one artifact (keeping ID {})", s.key, prev.id);
            aggregate.insert(s.key, prev);
        }
    }
    write_atomic(&paths.merged_file, &to_pretty_json(&aggregate, "aggregate")?)?;
    Ok(aggregate.len())
}
