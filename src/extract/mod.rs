//! Identifier extraction across heterogeneous dataset files.
//!
//! The extractor walks every configured dataset file, pulls referenced page
//! titles through the family's [`RecordAdapter`], and folds them into one
//! deduplicated, storage-form identifier set. The set is persisted twice —
//! as a sorted JSONL allow-list and as a sorted match-form plain list — from
//! the same in-memory set in a single call, so the two artifacts cannot
//! drift apart.
//!
//! Failure policy: a missing file is skipped with a warning and contributes
//! the empty set; a malformed record or line is skipped with a counter and a
//! line-number diagnostic. Only I/O errors on files that exist are fatal.

pub mod adapters;

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::CorpusError;

pub use adapters::{Link, LinkedRecord, Paragraph, ParagraphRecord, RecordAdapter};

/// One dataset file feeding the extractor: its source tag (also the leading
/// chunk-id component later in the pipeline), its schema family, and its
/// location on disk.
#[derive(Debug, Clone)]
pub struct DatasetSource {
    pub tag: String,
    pub adapter: RecordAdapter,
    pub path: PathBuf,
}

impl DatasetSource {
    pub fn new(tag: impl Into<String>, adapter: RecordAdapter, path: impl Into<PathBuf>) -> Self {
        Self {
            tag: tag.into(),
            adapter,
            path: path.into(),
        }
    }
}

/// Outcome of scanning a single dataset file.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordScan {
    pub records: usize,
    pub skipped: usize,
    pub missing: bool,
}

/// Aggregate counters for one extraction run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractReport {
    pub records: usize,
    pub identifiers: usize,
    pub skipped_records: usize,
    pub missing_files: usize,
}

/// Streams every record of a dataset file through `handle`.
///
/// Accepts both whole-file JSON arrays and line-delimited JSON: a file whose
/// first non-whitespace byte is `[` is parsed as an array, anything else
/// line by line. An array that fails to parse falls back to line mode so a
/// truncated array still yields its intact lines.
pub fn scan_records(
    path: &Path,
    mut handle: impl FnMut(Value),
) -> Result<RecordScan, CorpusError> {
    if !path.exists() {
        warn!(path = %path.display(), "dataset file missing, contributing nothing");
        return Ok(RecordScan {
            missing: true,
            ..RecordScan::default()
        });
    }

    let mut scan = RecordScan::default();
    let content_head = {
        use std::io::Read;
        let mut head = [0u8; 1];
        let mut probe = File::open(path)?;
        let mut first = None;
        loop {
            match probe.read(&mut head)? {
                0 => break,
                _ if head[0].is_ascii_whitespace() => continue,
                _ => {
                    first = Some(head[0]);
                    break;
                }
            }
        }
        first
    };

    if content_head == Some(b'[') {
        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<Vec<Value>>(&content) {
            Ok(records) => {
                for record in records {
                    scan.records += 1;
                    handle(record);
                }
                return Ok(scan);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "array parse failed, retrying line by line");
            }
        }
    }

    let reader = BufReader::new(File::open(path)?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(record) => {
                scan.records += 1;
                handle(record);
            }
            Err(err) => {
                scan.skipped += 1;
                debug!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %err,
                    "skipping malformed record"
                );
            }
        }
    }
    Ok(scan)
}

/// Extracts the union of referenced identifiers across all sources.
///
/// The returned set is storage-form and lexicographically ordered; records
/// that do not match their family's schema count as skipped.
pub fn extract_titles(
    sources: &[DatasetSource],
) -> Result<(BTreeSet<String>, ExtractReport), CorpusError> {
    let mut titles = BTreeSet::new();
    let mut report = ExtractReport::default();

    for source in sources {
        let mut malformed = 0usize;
        let scan = scan_records(&source.path, |record| {
            match source.adapter.extract_identifiers(record) {
                Some(ids) => titles.extend(ids),
                None => malformed += 1,
            }
        })?;
        report.records += scan.records;
        report.skipped_records += scan.skipped + malformed;
        if scan.missing {
            report.missing_files += 1;
        }
        debug!(
            tag = %source.tag,
            path = %source.path.display(),
            records = scan.records,
            skipped = scan.skipped + malformed,
            "scanned dataset file"
        );
    }

    report.identifiers = titles.len();
    Ok((titles, report))
}

/// Writes the sorted JSONL allow-list, one `{"title": <storage-form>}`
/// object per line.
pub fn write_allow_list(titles: &BTreeSet<String>, path: &Path) -> Result<(), CorpusError> {
    ensure_parent(path)?;
    let mut out = BufWriter::new(File::create(path)?);
    for title in titles {
        let line = serde_json::to_string(&serde_json::json!({ "title": title }))?;
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Writes the sorted match-form plain list, one identifier per line.
///
/// Derived from the same set as the allow-list; distinct storage forms that
/// collapse to one match form are deduplicated here.
pub fn write_match_list(titles: &BTreeSet<String>, path: &Path) -> Result<(), CorpusError> {
    ensure_parent(path)?;
    let lowered: BTreeSet<String> = titles
        .iter()
        .map(|title| crate::titles::normalize_match(title))
        .filter(|title| !title.is_empty())
        .collect();
    let mut out = BufWriter::new(File::create(path)?);
    for title in &lowered {
        out.write_all(title.as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

pub(crate) fn ensure_parent(path: &Path) -> Result<(), CorpusError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
