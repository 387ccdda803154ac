//! Transaction record I/O boundary.
//!
//! Records arrive as JSONL produced by an external generator or exporter;
//! the classifier only ever reads them.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::ClassificationResult;

/// One input transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Free-text transaction description.
    pub narration: String,
    /// Transaction amount, when known.
    #[serde(default)]
    pub amount: Option<f64>,
    /// Transaction date, when known.
    #[serde(default)]
    pub date: Option<String>,
}

impl TransactionRecord {
    pub fn new(narration: impl Into<String>, amount: Option<f64>) -> Self {
        Self {
            narration: narration.into(),
            amount,
            date: None,
        }
    }
}

/// Errors that can occur while reading or writing record files.
#[derive(Debug, Error)]
pub enum RecordIoError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid record on line {line}: {source}")]
    InvalidRecord {
        line: usize,
        source: serde_json::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load transaction records from a JSONL file, one record per line.
pub fn load_records_jsonl(path: &Path) -> Result<Vec<TransactionRecord>, RecordIoError> {
    let file = File::open(path).map_err(|source| RecordIoError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: TransactionRecord = serde_json::from_str(&line)
            .map_err(|source| RecordIoError::InvalidRecord {
                line: idx + 1,
                source,
            })?;
        records.push(record);
    }
    Ok(records)
}

/// Write classification results as JSONL, one result per line.
pub fn write_results_jsonl(
    path: &Path,
    results: &[ClassificationResult],
) -> Result<(), RecordIoError> {
    let mut file = File::create(path).map_err(|source| RecordIoError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    for result in results {
        let line = serde_json::to_string(result)?;
        writeln!(file, "{line}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_records_and_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        std::fs::write(
            &path,
            r#"{"narration":"cvs pharmacy prescription","amount":45.0,"date":"2026-01-15"}

{"narration":"payment to acme corp"}
"#,
        )
        .unwrap();

        let records = load_records_jsonl(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].amount, Some(45.0));
        assert_eq!(records[1].amount, None);
        assert_eq!(records[1].date, None);
    }

    #[test]
    fn reports_line_number_for_invalid_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        std::fs::write(
            &path,
            "{\"narration\":\"ok\"}\n{\"amount\":1.0}\n",
        )
        .unwrap();

        let err = load_records_jsonl(&path).unwrap_err();
        assert!(matches!(err, RecordIoError::InvalidRecord { line: 2, .. }));
    }

    #[test]
    fn missing_file_is_a_hard_failure() {
        let err = load_records_jsonl(Path::new("/nonexistent/records.jsonl")).unwrap_err();
        assert!(matches!(err, RecordIoError::Open { .. }));
    }
}
