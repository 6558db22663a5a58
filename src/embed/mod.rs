//! Batched embedding production behind an opaque provider seam.
//!
//! The pipeline never sees a model — only [`EmbeddingProvider`], an async
//! `texts -> vectors` function with a fixed output dimensionality. The
//! [`EmbeddingBatcher`] drives it in consecutive batches and enforces the
//! two invariants downstream indexing depends on:
//!
//! * every vector is L2-normalized, so dot products are cosine similarity;
//! * chunks and vectors travel as pairs — a batch either contributes all of
//!   its `(chunk, vector)` pairs in order, or none of them.
//!
//! A failed batch is dropped whole and the run continues: transient backend
//! failures cost coverage, never correctness.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::assemble::Chunk;
use crate::types::CorpusError;

/// Opaque text-to-vector function.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier of the backing model.
    fn id(&self) -> &str;

    /// Output dimensionality of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in input
    /// order. Vectors need not be normalized; the batcher normalizes.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CorpusError>;
}

/// Scales a vector to unit L2 norm in place. Zero vectors are left as-is
/// apart from the epsilon guard.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector
        .iter()
        .map(|value| value * value)
        .sum::<f32>()
        .sqrt()
        .max(f32::EPSILON);
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

/// Deterministic hash-derived embeddings for tests and offline runs.
///
/// The same text always maps to the same vector and distinct texts almost
/// always differ, which is all the pipeline invariants need.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self { dimensions: 8 }
    }

    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions.max(1);
        self
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn id(&self) -> &str {
        "mock"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CorpusError> {
        Ok(texts
            .iter()
            .map(|text| hash_to_vec(text, self.dimensions))
            .collect())
    }
}

fn hash_to_vec(text: &str, dimensions: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let seed = hasher.finish();
    (0..dimensions)
        .map(|i| {
            let bits = seed.rotate_left((i as u32 % 64) * 8) ^ ((i as u64) << 24);
            (bits as f64 / u32::MAX as f64) as f32
        })
        .collect()
}

/// Counters for one embedding run.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbedReport {
    pub embedded: usize,
    pub dropped_batches: usize,
    pub dropped_chunks: usize,
}

/// Drives an [`EmbeddingProvider`] over chunk sequences in bounded batches.
#[derive(Clone)]
pub struct EmbeddingBatcher {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl EmbeddingBatcher {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embeds `chunks` in consecutive batches of at most the configured
    /// size, returning aligned `(chunk, unit vector)` pairs.
    ///
    /// A provider error, or a response whose vector count does not match
    /// the batch, drops that whole batch with a diagnostic naming its start
    /// index; every other batch is unaffected.
    pub async fn embed_chunks(
        &self,
        chunks: Vec<Chunk>,
    ) -> (Vec<(Chunk, Vec<f32>)>, EmbedReport) {
        let mut embedded = Vec::with_capacity(chunks.len());
        let mut report = EmbedReport::default();
        let mut batch_start = 0usize;

        let mut pending = chunks.into_iter().peekable();
        while pending.peek().is_some() {
            let batch: Vec<Chunk> = pending.by_ref().take(self.batch_size).collect();
            let batch_len = batch.len();
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();

            match self.provider.embed_batch(&texts).await {
                Ok(vectors) if vectors.len() == batch_len => {
                    for (chunk, mut vector) in batch.into_iter().zip(vectors) {
                        l2_normalize(&mut vector);
                        embedded.push((chunk, vector));
                    }
                    report.embedded += batch_len;
                }
                Ok(vectors) => {
                    warn!(
                        batch_start,
                        expected = batch_len,
                        returned = vectors.len(),
                        "provider returned a misaligned batch; dropping it"
                    );
                    report.dropped_batches += 1;
                    report.dropped_chunks += batch_len;
                }
                Err(err) => {
                    warn!(
                        batch_start,
                        size = batch_len,
                        error = %err,
                        "embedding batch failed; dropping it"
                    );
                    report.dropped_batches += 1;
                    report.dropped_chunks += batch_len;
                }
            }
            batch_start += batch_len;
        }

        info!(
            embedded = report.embedded,
            dropped_batches = report.dropped_batches,
            dropped_chunks = report.dropped_chunks,
            model = self.provider.id(),
            "embedding run finished"
        );
        (embedded, report)
    }
}
