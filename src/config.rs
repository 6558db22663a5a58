//! Explicit, validated pipeline configuration.
//!
//! Every stage receives its parameters from a [`PipelineConfig`] handed in
//! by the caller — no stage reads environment variables or hard-coded paths
//! itself. The builder layers values in order (later wins):
//!
//! 1. compiled defaults (the production chunking configuration),
//! 2. programmatic overrides via the setters,
//! 3. `CHUNKFORGE_*` environment variables when [`with_env`] is enabled
//!    (a `.env` file is honored via `dotenvy`).
//!
//! Validation happens once in [`build`]: sizes must be positive and the
//! overlap strictly smaller than the chunk size. Anything invalid is a
//! fatal configuration error — the only error class that stops a run
//! before it starts.
//!
//! [`with_env`]: PipelineConfigBuilder::with_env
//! [`build`]: PipelineConfigBuilder::build

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::extract::{DatasetSource, RecordAdapter};
use crate::types::CorpusError;

/// Full configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root under which default artifact paths are derived.
    pub data_dir: PathBuf,
    /// Dataset files in the linked-context family, `(tag, path)`.
    pub linked_datasets: Vec<(String, PathBuf)>,
    /// Dataset files in the paragraph-list family, `(tag, path)`.
    pub paragraph_datasets: Vec<(String, PathBuf)>,
    /// Gzip-compressed JSONL dump of the encyclopedic corpus.
    pub dump_path: PathBuf,
    /// Sorted JSONL allow-list artifact (`{"title": ...}` per line).
    pub allow_list_path: PathBuf,
    /// Sorted match-form plain-list artifact (the filter's allow-set).
    pub match_list_path: PathBuf,
    /// Filtered pass-through subset of the dump.
    pub filtered_path: PathBuf,
    /// Chunk collection artifact (one chunk JSON object per line).
    pub chunks_path: PathBuf,
    /// Vector index database file.
    pub index_path: PathBuf,
    /// Leading chunk-id component for dump-derived chunks.
    pub wiki_source_tag: String,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Target overlap between consecutive chunks, in characters.
    pub chunk_overlap: usize,
    /// Dump sections shorter than this are discarded before segmentation.
    pub min_section_chars: usize,
    /// QA paragraphs shorter than this are discarded before segmentation.
    pub min_paragraph_chars: usize,
    /// Maximum texts per embedding-provider call.
    pub batch_size: usize,
    /// Identifier of the embedding model to bind.
    pub embedding_model: String,
    /// Dimensionality of the bound model's vectors.
    pub embedding_dimensions: usize,
}

impl PipelineConfig {
    /// Start building a configuration from the compiled defaults.
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Dataset sources for the extraction stage, both families combined.
    pub fn dataset_sources(&self) -> Vec<DatasetSource> {
        let linked = self
            .linked_datasets
            .iter()
            .map(|(tag, path)| DatasetSource::new(tag.as_str(), RecordAdapter::LinkedContext, path));
        let paragraphs = self
            .paragraph_datasets
            .iter()
            .map(|(tag, path)| DatasetSource::new(tag.as_str(), RecordAdapter::ParagraphList, path));
        linked.chain(paragraphs).collect()
    }
}

fn default_config(data_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        data_dir: data_dir.to_path_buf(),
        linked_datasets: vec![
            ("iirc".to_string(), data_dir.join("raw/iirc/train.json")),
            ("iirc".to_string(), data_dir.join("raw/iirc/dev.json")),
        ],
        paragraph_datasets: vec![
            ("musique".to_string(), data_dir.join("raw/musique/train.jsonl")),
            ("musique".to_string(), data_dir.join("raw/musique/dev.jsonl")),
        ],
        dump_path: data_dir.join("raw/enwiki-latest.jsonl.gz"),
        allow_list_path: data_dir.join("urls/unique_pages.jsonl"),
        match_list_path: data_dir.join("urls/unique_titles_lower.txt"),
        filtered_path: data_dir.join("processed/filtered_wiki.jsonl"),
        chunks_path: data_dir.join("processed/chunks.jsonl"),
        index_path: data_dir.join("index/chunks.sqlite"),
        wiki_source_tag: "wiki".to_string(),
        chunk_size: 350,
        chunk_overlap: 70,
        min_section_chars: 100,
        min_paragraph_chars: 50,
        batch_size: 128,
        embedding_model: "mock".to_string(),
        embedding_dimensions: 8,
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    data_dir: Option<PathBuf>,
    overrides: Vec<Override>,
    use_env: bool,
}

#[derive(Debug)]
enum Override {
    ChunkSize(usize),
    ChunkOverlap(usize),
    BatchSize(usize),
    EmbeddingModel(String),
    EmbeddingDimensions(usize),
    DumpPath(PathBuf),
    IndexPath(PathBuf),
    LinkedDatasets(Vec<(String, PathBuf)>),
    ParagraphDatasets(Vec<(String, PathBuf)>),
}

impl PipelineConfigBuilder {
    /// Set the data root; default artifact paths derive from it.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.overrides.push(Override::ChunkSize(size));
        self
    }

    #[must_use]
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.overrides.push(Override::ChunkOverlap(overlap));
        self
    }

    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.overrides.push(Override::BatchSize(size));
        self
    }

    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.overrides.push(Override::EmbeddingModel(model.into()));
        self
    }

    #[must_use]
    pub fn embedding_dimensions(mut self, dims: usize) -> Self {
        self.overrides.push(Override::EmbeddingDimensions(dims));
        self
    }

    #[must_use]
    pub fn dump_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.overrides.push(Override::DumpPath(path.into()));
        self
    }

    #[must_use]
    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.overrides.push(Override::IndexPath(path.into()));
        self
    }

    /// Replace the linked-context dataset list.
    #[must_use]
    pub fn linked_datasets(mut self, datasets: Vec<(String, PathBuf)>) -> Self {
        self.overrides.push(Override::LinkedDatasets(datasets));
        self
    }

    /// Replace the paragraph-list dataset list.
    #[must_use]
    pub fn paragraph_datasets(mut self, datasets: Vec<(String, PathBuf)>) -> Self {
        self.overrides.push(Override::ParagraphDatasets(datasets));
        self
    }

    /// Enable `CHUNKFORGE_*` environment overrides (applied after the
    /// programmatic ones).
    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Resolve and validate the final configuration.
    pub fn build(self) -> Result<PipelineConfig, CorpusError> {
        let mut data_dir = self.data_dir.unwrap_or_else(|| PathBuf::from("data"));

        if self.use_env {
            dotenvy::dotenv().ok();
            if let Ok(dir) = std::env::var("CHUNKFORGE_DATA_DIR") {
                data_dir = PathBuf::from(dir);
            }
        }

        let mut config = default_config(&data_dir);
        for value in self.overrides {
            apply_override(&mut config, value);
        }

        if self.use_env {
            apply_env(&mut config)?;
        }

        validate(&config)?;
        Ok(config)
    }
}

fn apply_override(config: &mut PipelineConfig, value: Override) {
    match value {
        Override::ChunkSize(size) => config.chunk_size = size,
        Override::ChunkOverlap(overlap) => config.chunk_overlap = overlap,
        Override::BatchSize(size) => config.batch_size = size,
        Override::EmbeddingModel(model) => config.embedding_model = model,
        Override::EmbeddingDimensions(dims) => config.embedding_dimensions = dims,
        Override::DumpPath(path) => config.dump_path = path,
        Override::IndexPath(path) => config.index_path = path,
        Override::LinkedDatasets(datasets) => config.linked_datasets = datasets,
        Override::ParagraphDatasets(datasets) => config.paragraph_datasets = datasets,
    }
}

fn apply_env(config: &mut PipelineConfig) -> Result<(), CorpusError> {
    if let Ok(value) = std::env::var("CHUNKFORGE_CHUNK_SIZE") {
        config.chunk_size = parse_env("CHUNKFORGE_CHUNK_SIZE", &value)?;
    }
    if let Ok(value) = std::env::var("CHUNKFORGE_CHUNK_OVERLAP") {
        config.chunk_overlap = parse_env("CHUNKFORGE_CHUNK_OVERLAP", &value)?;
    }
    if let Ok(value) = std::env::var("CHUNKFORGE_BATCH_SIZE") {
        config.batch_size = parse_env("CHUNKFORGE_BATCH_SIZE", &value)?;
    }
    if let Ok(value) = std::env::var("CHUNKFORGE_EMBEDDING_MODEL") {
        config.embedding_model = value;
    }
    if let Ok(value) = std::env::var("CHUNKFORGE_EMBEDDING_DIMENSIONS") {
        config.embedding_dimensions = parse_env("CHUNKFORGE_EMBEDDING_DIMENSIONS", &value)?;
    }
    if let Ok(value) = std::env::var("CHUNKFORGE_DUMP_PATH") {
        config.dump_path = PathBuf::from(value);
    }
    if let Ok(value) = std::env::var("CHUNKFORGE_INDEX_PATH") {
        config.index_path = PathBuf::from(value);
    }
    Ok(())
}

fn parse_env(key: &str, value: &str) -> Result<usize, CorpusError> {
    value
        .parse::<usize>()
        .map_err(|_| CorpusError::Config(format!("{key} must be a positive integer, got '{value}'")))
}

fn validate(config: &PipelineConfig) -> Result<(), CorpusError> {
    if config.chunk_size == 0 {
        return Err(CorpusError::Config("chunk size must be positive".into()));
    }
    if config.chunk_overlap >= config.chunk_size {
        return Err(CorpusError::Config(format!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            config.chunk_overlap, config.chunk_size
        )));
    }
    if config.batch_size == 0 {
        return Err(CorpusError::Config("batch size must be positive".into()));
    }
    if config.embedding_dimensions == 0 {
        return Err(CorpusError::Config(
            "embedding dimensions must be positive".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_production_configuration() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.chunk_size, 350);
        assert_eq!(config.chunk_overlap, 70);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.min_section_chars, 100);
        assert_eq!(config.min_paragraph_chars, 50);
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let err = PipelineConfig::builder()
            .chunk_size(100)
            .chunk_overlap(100)
            .build()
            .unwrap_err();
        assert!(matches!(err, CorpusError::Config(_)));
    }

    #[test]
    fn setters_override_defaults() {
        let config = PipelineConfig::builder()
            .data_dir("/tmp/corpus")
            .chunk_size(500)
            .chunk_overlap(50)
            .batch_size(16)
            .build()
            .unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/corpus"));
        assert!(config.dump_path.starts_with("/tmp/corpus"));
    }

    #[test]
    fn dataset_sources_cover_both_families() {
        let config = PipelineConfig::builder().build().unwrap();
        let sources = config.dataset_sources();
        assert_eq!(sources.len(), 4);
        assert!(sources.iter().any(|s| s.tag == "iirc"));
        assert!(sources.iter().any(|s| s.tag == "musique"));
    }
}
