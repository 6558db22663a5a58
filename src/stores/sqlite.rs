//! SQLite + sqlite-vec vector index.
//!
//! Layout: a `chunks` table holding the full metadata record keyed by
//! `chunk_id`, and a `chunks_embeddings` vec0 virtual table holding one
//! vector per embedded chunk, joined by rowid. Vectors are passed to
//! sqlite-vec as JSON array literals.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use tokio_rusqlite::{Connection, OptionalExtension, ffi};
use tracing::info;

use crate::assemble::Chunk;
use crate::embed::{EmbeddingProvider, l2_normalize};
use crate::types::CorpusError;

/// Similarity-searchable, disk-persisted store of embedded chunks.
///
/// [`open`](Self::open) doubles as the load operation: pointing it at an
/// existing database file reconstitutes the index (the schema statements
/// are `IF NOT EXISTS`). The dimensionality must match the one the file
/// was created with; a mismatch surfaces as a storage error on the first
/// insert.
pub struct SqliteVectorIndex {
    conn: Connection,
    dims: usize,
}

impl SqliteVectorIndex {
    /// Opens (or creates) the index at `path` with `dims`-dimensional
    /// vectors.
    pub async fn open(path: impl AsRef<Path>, dims: usize) -> Result<Self, CorpusError> {
        register_sqlite_vec()?;
        let conn = Connection::open(path.as_ref().to_path_buf())
            .await
            .map_err(storage_err)?;

        // Probe that the extension actually loaded before touching vec0.
        conn.call(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Rusqlite)
        })
        .await
        .map_err(storage_err)?;

        let schema = format!(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                section_title TEXT NOT NULL,
                url TEXT NOT NULL,
                source TEXT NOT NULL,
                section_index INTEGER NOT NULL,
                chunk_in_section INTEGER NOT NULL,
                text_length INTEGER NOT NULL,
                content TEXT NOT NULL,
                example_id TEXT,
                is_supporting INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_title ON chunks(title);
            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_embeddings USING vec0(embedding float[{dims}]);"
        );
        conn.call(move |conn| {
            conn.execute_batch(&schema)
                .map_err(tokio_rusqlite::Error::Rusqlite)
        })
        .await
        .map_err(storage_err)?;

        info!(dims, "opened vector index");
        Ok(Self { conn, dims })
    }

    /// Vector dimensionality this index was opened with.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Inserts aligned `(chunk, vector)` pairs in one transaction.
    ///
    /// Existing ids are overwritten (metadata and vector both), so calling
    /// this again with the same records is a no-op for the row count.
    pub async fn add_embedded(
        &self,
        records: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<usize, CorpusError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut rows = Vec::with_capacity(records.len());
        for (chunk, vector) in records {
            if vector.len() != self.dims {
                return Err(CorpusError::Storage(format!(
                    "vector for chunk '{}' has {} dimensions, index expects {}",
                    chunk.chunk_id,
                    vector.len(),
                    self.dims
                )));
            }
            let encoded = serde_json::to_string(&vector)?;
            rows.push((chunk, encoded));
        }

        let inserted = rows.len();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (chunk, encoded) in &rows {
                    tx.execute(
                        "INSERT INTO chunks (chunk_id, title, section_title, url, source,
                                             section_index, chunk_in_section, text_length,
                                             content, example_id, is_supporting)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                         ON CONFLICT(chunk_id) DO UPDATE SET
                             title = excluded.title,
                             section_title = excluded.section_title,
                             url = excluded.url,
                             source = excluded.source,
                             section_index = excluded.section_index,
                             chunk_in_section = excluded.chunk_in_section,
                             text_length = excluded.text_length,
                             content = excluded.content,
                             example_id = excluded.example_id,
                             is_supporting = excluded.is_supporting",
                        (
                            &chunk.chunk_id,
                            &chunk.title,
                            &chunk.section_title,
                            &chunk.url,
                            &chunk.source,
                            chunk.section_index as i64,
                            chunk.chunk_in_section as i64,
                            chunk.text_length as i64,
                            &chunk.text,
                            &chunk.example_id,
                            chunk.is_supporting,
                        ),
                    )?;
                    let rowid: i64 = tx.query_row(
                        "SELECT rowid FROM chunks WHERE chunk_id = ?1",
                        [&chunk.chunk_id],
                        |row| row.get(0),
                    )?;
                    tx.execute("DELETE FROM chunks_embeddings WHERE rowid = ?1", [rowid])?;
                    tx.execute(
                        "INSERT INTO chunks_embeddings (rowid, embedding) VALUES (?1, ?2)",
                        (rowid, encoded.as_str()),
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(storage_err)?;
        Ok(inserted)
    }

    /// Number of stored vectors — equals the number of successfully
    /// embedded chunks, not the number of chunks read from input.
    pub async fn ntotal(&self) -> Result<usize, CorpusError> {
        self.conn
            .call(|conn| {
                conn.query_row("SELECT COUNT(*) FROM chunks_embeddings", [], |row| {
                    row.get::<_, i64>(0)
                })
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map(|count| count as usize)
            .map_err(storage_err)
    }

    /// Fetches a chunk's metadata record by id.
    pub async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>, CorpusError> {
        let chunk_id = chunk_id.to_string();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT chunk_id, title, section_title, url, source, section_index, \
                            chunk_in_section, text_length, content, example_id, is_supporting \
                     FROM chunks WHERE chunk_id = ?1",
                    [&chunk_id],
                    |row| {
                        Ok(Chunk {
                            chunk_id: row.get(0)?,
                            title: row.get(1)?,
                            section_title: row.get(2)?,
                            url: row.get(3)?,
                            source: row.get(4)?,
                            section_index: row.get::<_, i64>(5)? as usize,
                            chunk_in_section: row.get::<_, i64>(6)? as usize,
                            text_length: row.get::<_, i64>(7)? as usize,
                            text: row.get(8)?,
                            example_id: row.get(9)?,
                            is_supporting: row.get(10)?,
                        })
                    },
                )
                .optional()
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(storage_err)
    }

    /// Cosine-similarity search over the stored vectors.
    ///
    /// Returns the `top_k` most similar chunks, most similar first, with
    /// `similarity = 1 - cosine distance`. The query vector must already be
    /// embedded (and should be unit length); the store does not embed.
    pub async fn search(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<(Chunk, f32)>, CorpusError> {
        let encoded = serde_json::to_string(query)?;
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT c.chunk_id, c.title, c.section_title, c.url, c.source, \
                            c.section_index, c.chunk_in_section, c.text_length, c.content, \
                            c.example_id, c.is_supporting, \
                            vec_distance_cosine(e.embedding, vec_f32(?1)) AS distance \
                     FROM chunks c \
                     JOIN chunks_embeddings e ON e.rowid = c.rowid \
                     ORDER BY distance ASC \
                     LIMIT {top_k}"
                ))?;
                let rows = stmt.query_map([&encoded], |row| {
                    let chunk = Chunk {
                        chunk_id: row.get(0)?,
                        title: row.get(1)?,
                        section_title: row.get(2)?,
                        url: row.get(3)?,
                        source: row.get(4)?,
                        section_index: row.get::<_, i64>(5)? as usize,
                        chunk_in_section: row.get::<_, i64>(6)? as usize,
                        text_length: row.get::<_, i64>(7)? as usize,
                        text: row.get(8)?,
                        example_id: row.get(9)?,
                        is_supporting: row.get(10)?,
                    };
                    let distance: f32 = row.get(11)?;
                    Ok((chunk, 1.0 - distance))
                })?;
                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row?);
                }
                Ok(hits)
            })
            .await
            .map_err(storage_err)
    }

    /// Embeds `query` with the supplied provider and searches with the
    /// result — the reconstitution path for a reopened index, which must be
    /// bound to the same embedding function the corpus was built with.
    pub async fn search_text(
        &self,
        provider: &dyn EmbeddingProvider,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<(Chunk, f32)>, CorpusError> {
        let vectors = provider.embed_batch(&[query.to_string()]).await?;
        let mut vector = vectors.into_iter().next().ok_or_else(|| {
            CorpusError::Embedding("provider returned no vector for the query".to_string())
        })?;
        l2_normalize(&mut vector);
        self.search(&vector, top_k).await
    }
}

fn storage_err(err: tokio_rusqlite::Error) -> CorpusError {
    CorpusError::Storage(err.to_string())
}

/// Registers the sqlite-vec extension for every connection opened by this
/// process. Safe to call repeatedly; the registration happens once.
fn register_sqlite_vec() -> Result<(), CorpusError> {
    use std::sync::Mutex;

    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *const c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!(
                    "failed to register sqlite-vec extension (code {rc})"
                ))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(CorpusError::Storage)
}
