//! Chunk records: construction, deterministic identity, and streaming
//! persistence.
//!
//! A [`Chunk`] carries everything downstream retrieval needs — the segment
//! text plus provenance metadata — under an id that is a pure function of
//! (source tag, storage-form title, section index, segment index). Re-running
//! the pipeline over unchanged input therefore reproduces the exact same id
//! set, which is what makes index rebuilds idempotent.
//!
//! Chunks are appended to disk one JSONL line at a time as they are
//! produced; nothing buffers the whole corpus.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dump::WikiDoc;
use crate::extract::{Paragraph, ensure_parent};
use crate::segmenter::RecursiveSegmenter;
use crate::titles::normalize_storage;
use crate::types::CorpusError;

/// Placeholder used when a document or paragraph carries no usable title.
pub const TITLE_SENTINEL: &str = "NoTitle";

/// Display URL for a storage-form title.
pub fn wiki_url(storage_title: &str) -> String {
    format!("https://en.wikipedia.org/wiki/{storage_title}")
}

/// One bounded, possibly overlapping segment of a source document, with
/// identity and provenance metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub title: String,
    pub section_title: String,
    pub url: String,
    pub text: String,
    pub source: String,
    pub section_index: usize,
    pub chunk_in_section: usize,
    /// Character length of `text`; redundant, kept for downstream filtering.
    pub text_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_supporting: Option<bool>,
}

/// Counters for one assembly run.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssembleReport {
    pub documents: usize,
    pub chunks: usize,
    pub skipped_short: usize,
    pub skipped_invalid: usize,
}

impl AssembleReport {
    pub fn absorb(&mut self, other: AssembleReport) {
        self.documents += other.documents;
        self.chunks += other.chunks;
        self.skipped_short += other.skipped_short;
        self.skipped_invalid += other.skipped_invalid;
    }
}

/// Turns source documents into [`Chunk`] records via a configured
/// segmenter, applying the document-level minimum-length gates before any
/// text reaches the segmenter.
#[derive(Debug, Clone)]
pub struct ChunkAssembler {
    segmenter: RecursiveSegmenter,
    min_section_chars: usize,
    min_paragraph_chars: usize,
}

impl ChunkAssembler {
    pub fn new(
        segmenter: RecursiveSegmenter,
        min_section_chars: usize,
        min_paragraph_chars: usize,
    ) -> Self {
        Self {
            segmenter,
            min_section_chars,
            min_paragraph_chars,
        }
    }

    /// Chunks one section-bearing dump document.
    ///
    /// Ids follow `{tag}_{storage_title}_sec{section}_{segment}`; sections
    /// shorter than the gate are discarded whole.
    pub fn assemble_wiki_doc(
        &self,
        source_tag: &str,
        doc: &WikiDoc,
        report: &mut AssembleReport,
    ) -> Vec<Chunk> {
        let storage_title = storage_or_sentinel(&doc.title);
        let display_title = if doc.title.trim().is_empty() {
            TITLE_SENTINEL.to_string()
        } else {
            doc.title.trim().to_string()
        };
        let url = wiki_url(&storage_title);

        let mut chunks = Vec::new();
        for (section_index, (section_title, section_text)) in doc.sections().enumerate() {
            let section_text = section_text.trim();
            if section_text.chars().count() < self.min_section_chars {
                report.skipped_short += 1;
                continue;
            }
            for (segment_index, segment) in self.segmenter.split(section_text).iter().enumerate() {
                let text = segment.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                let text_length = text.chars().count();
                chunks.push(Chunk {
                    chunk_id: format!(
                        "{source_tag}_{storage_title}_sec{section_index}_{segment_index}"
                    ),
                    title: display_title.clone(),
                    section_title: section_title.to_string(),
                    url: url.clone(),
                    text,
                    source: source_tag.to_string(),
                    section_index,
                    chunk_in_section: segment_index,
                    text_length,
                    example_id: None,
                    is_supporting: None,
                });
            }
        }
        report.documents += 1;
        report.chunks += chunks.len();
        chunks
    }

    /// Chunks the paragraphs of one QA example in a single pass.
    ///
    /// Ids follow `{tag}_{storage_title}_{segment}`; the flat family has no
    /// sections, so `section_index` is always 0 and `section_title` empty.
    pub fn assemble_paragraphs(
        &self,
        source_tag: &str,
        example_id: Option<&str>,
        paragraphs: &[Paragraph],
        report: &mut AssembleReport,
    ) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for paragraph in paragraphs {
            let storage_title = storage_or_sentinel(paragraph.title.as_deref().unwrap_or(""));
            let display_title = storage_title.replace('_', " ");
            let url = wiki_url(&storage_title);

            let Some(body) = paragraph.body() else {
                report.skipped_invalid += 1;
                continue;
            };
            let body = body.trim();
            if body.chars().count() < self.min_paragraph_chars {
                report.skipped_short += 1;
                continue;
            }

            for (segment_index, segment) in self.segmenter.split(body).iter().enumerate() {
                let text = segment.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                let text_length = text.chars().count();
                chunks.push(Chunk {
                    chunk_id: format!("{source_tag}_{storage_title}_{segment_index}"),
                    title: display_title.clone(),
                    section_title: String::new(),
                    url: url.clone(),
                    text,
                    source: source_tag.to_string(),
                    section_index: 0,
                    chunk_in_section: segment_index,
                    text_length,
                    example_id: example_id.map(str::to_string),
                    is_supporting: paragraph.is_supporting,
                });
            }
        }
        report.documents += 1;
        report.chunks += chunks.len();
        chunks
    }
}

fn storage_or_sentinel(raw_title: &str) -> String {
    let storage = normalize_storage(raw_title);
    if storage.is_empty() {
        TITLE_SENTINEL.to_string()
    } else {
        storage
    }
}

/// Appends chunk records to a JSONL file, one line per chunk, as they are
/// produced.
#[derive(Debug)]
pub struct ChunkWriter {
    inner: BufWriter<File>,
    written: usize,
}

impl ChunkWriter {
    pub fn create(path: &Path) -> Result<Self, CorpusError> {
        ensure_parent(path)?;
        Ok(Self {
            inner: BufWriter::new(File::create(path)?),
            written: 0,
        })
    }

    pub fn write(&mut self, chunk: &Chunk) -> Result<(), CorpusError> {
        let line = serde_json::to_string(chunk)?;
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(mut self) -> Result<usize, CorpusError> {
        self.inner.flush()?;
        Ok(self.written)
    }
}

/// Streams chunk records back from a JSONL file, skipping (and counting)
/// lines that fail to parse.
#[derive(Debug)]
pub struct ChunkReader {
    lines: std::io::Lines<BufReader<File>>,
    skipped: usize,
    line_no: usize,
}

impl ChunkReader {
    pub fn open(path: &Path) -> Result<Self, CorpusError> {
        Ok(Self {
            lines: BufReader::new(File::open(path)?).lines(),
            skipped: 0,
            line_no: 0,
        })
    }

    /// Number of malformed lines skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Next parseable chunk, or `None` at end of file. I/O errors are
    /// fatal; parse errors are absorbed into [`skipped`](Self::skipped).
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, CorpusError> {
        for line in self.lines.by_ref() {
            let line = line?;
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Chunk>(&line) {
                Ok(chunk) => return Ok(Some(chunk)),
                Err(err) => {
                    self.skipped += 1;
                    debug!(line = self.line_no, error = %err, "skipping malformed chunk line");
                }
            }
        }
        Ok(None)
    }

    /// Up to `max` further chunks, preserving file order.
    pub fn next_batch(&mut self, max: usize) -> Result<Vec<Chunk>, CorpusError> {
        let mut batch = Vec::with_capacity(max.min(1024));
        while batch.len() < max {
            match self.next_chunk()? {
                Some(chunk) => batch.push(chunk),
                None => break,
            }
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ParagraphRecord;

    fn assembler() -> ChunkAssembler {
        ChunkAssembler::new(RecursiveSegmenter::new(), 100, 50)
    }

    fn wiki_doc(title: &str, sections: &[(&str, &str)]) -> WikiDoc {
        serde_json::from_value(serde_json::json!({
            "title": title,
            "section_titles": sections.iter().map(|(t, _)| t).collect::<Vec<_>>(),
            "section_texts": sections.iter().map(|(_, b)| b).collect::<Vec<_>>(),
        }))
        .unwrap()
    }

    #[test]
    fn wiki_chunks_carry_section_scoped_ids_and_urls() {
        let body = "Cryptography is the practice and study of techniques for secure \
                    communication in the presence of adversarial behavior."
            .repeat(2);
        let doc = wiki_doc("Cryptography", &[("Introduction", &body)]);
        let mut report = AssembleReport::default();
        let chunks = assembler().assemble_wiki_doc("wiki", &doc, &mut report);

        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].chunk_id, "wiki_Cryptography_sec0_0");
        assert_eq!(chunks[0].url, "https://en.wikipedia.org/wiki/Cryptography");
        assert_eq!(chunks[0].section_title, "Introduction");
        assert_eq!(chunks[0].source, "wiki");
        for chunk in &chunks {
            assert_eq!(chunk.text_length, chunk.text.chars().count());
        }
    }

    #[test]
    fn short_sections_are_gated_before_segmentation() {
        let doc = wiki_doc(
            "Stub Page",
            &[("Intro", "Too short."), ("Empty", "   ")],
        );
        let mut report = AssembleReport::default();
        let chunks = assembler().assemble_wiki_doc("wiki", &doc, &mut report);

        assert!(chunks.is_empty());
        assert_eq!(report.skipped_short, 2);
        assert_eq!(report.documents, 1);
    }

    #[test]
    fn paragraph_chunks_use_the_flat_id_scheme() {
        let record: ParagraphRecord = serde_json::from_value(serde_json::json!({
            "id": "2hop_17",
            "paragraphs": [{
                "title": "Enigma machine",
                "paragraph_text": "The Enigma machine is a cipher device developed and used in \
                                   the early to mid-20th century to protect communication.",
                "is_supporting": true,
            }]
        }))
        .unwrap();
        let mut report = AssembleReport::default();
        let chunks = assembler().assemble_paragraphs(
            "musique",
            record.id.as_deref(),
            &record.paragraphs,
            &mut report,
        );

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "musique_Enigma_machine_0");
        assert_eq!(chunks[0].title, "Enigma machine");
        assert_eq!(chunks[0].section_index, 0);
        assert_eq!(chunks[0].example_id.as_deref(), Some("2hop_17"));
        assert_eq!(chunks[0].is_supporting, Some(true));
    }

    #[test]
    fn missing_titles_fall_back_to_the_sentinel() {
        let record: ParagraphRecord = serde_json::from_value(serde_json::json!({
            "paragraphs": [{
                "paragraph_text": "An orphan paragraph with enough text to clear the minimum \
                                   length gate for the flat-paragraph family.",
            }]
        }))
        .unwrap();
        let mut report = AssembleReport::default();
        let chunks =
            assembler().assemble_paragraphs("musique", None, &record.paragraphs, &mut report);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "musique_NoTitle_0");
        assert_eq!(chunks[0].url, "https://en.wikipedia.org/wiki/NoTitle");
    }

    #[test]
    fn writer_and_reader_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.jsonl");

        let body = "A section body long enough to clear the quality gate and produce at \
                    least one chunk of output text for this round-trip test."
            .to_string();
        let doc = wiki_doc("Round Trip", &[("Only", &body)]);
        let mut report = AssembleReport::default();
        let chunks = assembler().assemble_wiki_doc("wiki", &doc, &mut report);

        let mut writer = ChunkWriter::create(&path).unwrap();
        for chunk in &chunks {
            writer.write(chunk).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), chunks.len());

        let mut reader = ChunkReader::open(&path).unwrap();
        let mut read_back = Vec::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            read_back.push(chunk);
        }
        assert_eq!(read_back, chunks);
        assert_eq!(reader.skipped(), 0);
    }

    #[test]
    fn reader_skips_malformed_lines_with_a_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.jsonl");
        std::fs::write(&path, "garbage\n").unwrap();

        let mut reader = ChunkReader::open(&path).unwrap();
        assert!(reader.next_chunk().unwrap().is_none());
        assert_eq!(reader.skipped(), 1);
    }
}
