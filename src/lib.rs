//! Retrieval-corpus construction for multi-hop question answering.
//!
//! ```text
//! QA dataset files ──► extract (record adapters) ──► identifier set
//!                                                       │
//!                          allow-list + match-form list ◄┘
//!                                                       │
//! dump (.jsonl.gz) ──► dump::filter_dump ───────────────┘ (membership)
//!        │
//!        ▼
//! assemble (segmenter) ──► chunk JSONL ──► embed (batches) ──► stores::sqlite
//! ```
//!
//! The title normalizer ([`titles`]) is the one canonicalization shared by
//! the extractor and the filter; everything downstream keys off the
//! deterministic chunk ids produced by [`assemble`].

pub mod assemble;
pub mod config;
pub mod dump;
pub mod embed;
pub mod extract;
pub mod segmenter;
pub mod stores;
pub mod titles;
pub mod types;

pub use assemble::{Chunk, ChunkAssembler, ChunkReader, ChunkWriter};
pub use config::PipelineConfig;
pub use dump::AllowSet;
pub use embed::{EmbeddingBatcher, EmbeddingProvider, MockEmbeddingProvider};
pub use segmenter::RecursiveSegmenter;
pub use stores::SqliteVectorIndex;
pub use types::CorpusError;
