//! Shared error taxonomy for the corpus pipeline.
//!
//! Only resource- and setup-level failures surface as [`CorpusError`]: an
//! output directory that cannot be created, a corrupt allow-set file, a
//! vector store that refuses an insert. Record-level problems (a malformed
//! JSON line, a too-short paragraph, a failed embedding batch) never reach
//! this type — the stage that hits them increments a counter in its report
//! and keeps streaming.

use thiserror::Error;

/// Fatal errors that abort a pipeline stage.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// Underlying filesystem or stream I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Invalid or unusable configuration (bad sizes, unreadable allow-set).
    #[error("configuration error: {0}")]
    Config(String),

    /// Vector store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A record or vector could not be serialized for persistence.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The embedding provider failed outside the recoverable per-batch path.
    #[error("embedding error: {0}")]
    Embedding(String),
}
