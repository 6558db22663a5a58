//! Streaming filter over the compressed encyclopedic dump.
//!
//! The dump is one JSON document per line, gzip-compressed, and far too
//! large to load wholesale. [`filter_dump`] walks it a line at a time and
//! keeps exactly the documents whose normalized title is in the
//! [`AllowSet`], writing the original line bytes through unchanged. Memory
//! stays constant beyond the allow-set and a single in-flight line.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::extract::ensure_parent;
use crate::titles::normalize_match;
use crate::types::CorpusError;

/// A dump document: a title plus parallel section-title / section-text
/// lists. Sections are consumed zipped; unequal list lengths truncate to
/// the shorter side.
#[derive(Debug, Clone, Deserialize)]
pub struct WikiDoc {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub section_titles: Vec<String>,
    #[serde(default)]
    pub section_texts: Vec<String>,
}

impl WikiDoc {
    /// Ordered `(section_title, section_text)` pairs.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &str)> {
        self.section_titles
            .iter()
            .map(String::as_str)
            .zip(self.section_texts.iter().map(String::as_str))
    }
}

/// Match-form identifier set the filter tests membership against.
///
/// Loaded once, read-only afterwards; safe to share across stages.
#[derive(Debug, Clone, Default)]
pub struct AllowSet {
    titles: HashSet<String>,
}

impl AllowSet {
    /// Builds the set from raw identifiers, normalizing each to match form
    /// and dropping the ones that normalize to nothing.
    pub fn from_titles<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let titles = titles
            .into_iter()
            .map(|raw| normalize_match(raw.as_ref()))
            .filter(|title| !title.is_empty())
            .collect();
        Self { titles }
    }

    /// Loads the set from the persisted match-form list, one identifier per
    /// line. An unreadable or empty file is a configuration error: running
    /// the filter against an empty allow-set silently discards the whole
    /// dump, which is never intended.
    pub fn load(path: &Path) -> Result<Self, CorpusError> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            CorpusError::Config(format!("cannot read allow-set {}: {err}", path.display()))
        })?;
        let set = Self::from_titles(content.lines());
        if set.is_empty() {
            return Err(CorpusError::Config(format!(
                "allow-set {} contains no usable identifiers",
                path.display()
            )));
        }
        info!(path = %path.display(), titles = set.len(), "loaded allow-set");
        Ok(set)
    }

    /// Membership test for a raw (arbitrary-case) document title.
    pub fn contains_title(&self, raw_title: &str) -> bool {
        self.titles.contains(&normalize_match(raw_title))
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

/// Counters for one filtering run.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterReport {
    pub scanned: usize,
    pub retained: usize,
    pub skipped_invalid: usize,
}

#[derive(Debug, Deserialize)]
struct TitleProbe {
    #[serde(default)]
    title: String,
}

/// Streams line-delimited JSON documents from `input`, writing the lines
/// whose title is allowed to `output` byte-for-byte.
///
/// A line that fails to parse is counted and skipped; the stream continues.
/// I/O errors on either side are fatal.
pub fn filter_dump(
    input: impl BufRead,
    allow: &AllowSet,
    mut output: impl Write,
) -> Result<FilterReport, CorpusError> {
    let mut report = FilterReport::default();
    for (line_no, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        report.scanned += 1;
        match serde_json::from_str::<TitleProbe>(&line) {
            Ok(probe) => {
                if allow.contains_title(&probe.title) {
                    output.write_all(line.as_bytes())?;
                    output.write_all(b"\n")?;
                    report.retained += 1;
                }
            }
            Err(err) => {
                report.skipped_invalid += 1;
                debug!(line = line_no + 1, error = %err, "skipping unparseable dump line");
            }
        }
    }
    output.flush()?;
    Ok(report)
}

/// Opens a gzip-compressed dump for line-oriented reading.
pub fn open_dump(path: &Path) -> Result<BufReader<MultiGzDecoder<File>>, CorpusError> {
    let file = File::open(path)?;
    Ok(BufReader::new(MultiGzDecoder::new(file)))
}

/// Convenience wrapper: gzip dump in, filtered plain JSONL out.
pub fn filter_dump_file(
    dump_path: &Path,
    allow: &AllowSet,
    output_path: &Path,
) -> Result<FilterReport, CorpusError> {
    let reader = open_dump(dump_path)?;
    ensure_parent(output_path)?;
    let writer = BufWriter::new(File::create(output_path)?);
    let report = filter_dump(reader, allow, writer)?;
    if report.skipped_invalid > 0 {
        warn!(
            skipped = report.skipped_invalid,
            "dump contained unparseable lines"
        );
    }
    info!(
        scanned = report.scanned,
        retained = report.retained,
        "filtered dump"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retains_only_allowed_titles_and_passes_lines_through() {
        let allow = AllowSet::from_titles(["Cryptography", "Bletchley_Park"]);
        let input = concat!(
            "{\"title\": \"Cryptography\", \"section_texts\": [\"...\"]}\n",
            "{\"title\": \"Unrelated Page\"}\n",
            "{\"title\": \"BLETCHLEY PARK\"}\n",
        );
        let mut output = Vec::new();
        let report = filter_dump(input.as_bytes(), &allow, &mut output).unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.retained, 2);
        assert_eq!(report.skipped_invalid, 0);
        let written = String::from_utf8(output).unwrap();
        // Retained lines are the original bytes, not a re-serialization.
        assert!(written.contains("{\"title\": \"Cryptography\", \"section_texts\": [\"...\"]}\n"));
        assert!(written.contains("{\"title\": \"BLETCHLEY PARK\"}\n"));
        assert!(!written.contains("Unrelated"));
    }

    #[test]
    fn unparseable_lines_are_counted_and_skipped() {
        let allow = AllowSet::from_titles(["Kept"]);
        let input = "{\"title\": \"Kept\"}\n{{{ broken\n\n{\"title\": \"Kept\"}\n";
        let mut output = Vec::new();
        let report = filter_dump(input.as_bytes(), &allow, &mut output).unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.retained, 2);
        assert_eq!(report.skipped_invalid, 1);
    }

    #[test]
    fn empty_allow_set_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("titles.txt");
        std::fs::write(&path, "\n\n").unwrap();
        let err = AllowSet::load(&path).unwrap_err();
        assert!(matches!(err, CorpusError::Config(_)));
    }

    #[test]
    fn wikidoc_sections_zip_parallel_lists() {
        let doc: WikiDoc = serde_json::from_str(
            "{\"title\":\"T\",\"section_titles\":[\"Intro\",\"History\"],\"section_texts\":[\"a\",\"b\"]}",
        )
        .unwrap();
        let sections: Vec<_> = doc.sections().collect();
        assert_eq!(sections, vec![("Intro", "a"), ("History", "b")]);
    }
}
