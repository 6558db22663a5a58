//! Persistence backends for embedded chunks.
//!
//! ```text
//!  (Chunk, vector) pairs ──► SqliteVectorIndex ──► chunks table (by id)
//!                                   │              chunks_embeddings (vec0)
//!                                   └─► cosine search over stored vectors
//! ```
//!
//! The store keys every row by `chunk_id`, so re-adding a chunk is a
//! defined overwrite rather than a duplicate — rebuilding the index over
//! unchanged input leaves the row count unchanged. The store never embeds
//! anything itself: reopening it for querying requires the same embedding
//! provider bound at a higher level (see
//! [`SqliteVectorIndex::search_text`]).

pub mod sqlite;

pub use sqlite::SqliteVectorIndex;
