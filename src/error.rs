use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// A required structural anchor was missing from an entry's markup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error for {entry_id}: {reason}")]
pub struct ParseError {
    pub entry_id: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(entry_id: &str, reason: impl Into<String>) -> Self {
        ParseError {
            entry_id: entry_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Why an entry did not produce a record in this run. None of these abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum SkipReason {
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Parse(String),
    #[error("duplicate catalog number (first seen as {first_key:?})")]
    Duplicate { first_key: String },
    #[error("already exported in a previous run")]
    Resumed,
}

impl From<ParseError> for SkipReason {
    fn from(e: ParseError) -> Self {
        SkipReason::Parse(e.reason)
    }
}

/// Artifact storage failures. These are the only process-fatal errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to {op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("incomplete write to {path}: wrote {written} of {expected} bytes")]
    Incomplete {
        path: PathBuf,
        written: u64,
        expected: u64,
    },
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ExportError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExportError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
