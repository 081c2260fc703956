//! Keyword index over text-splitter chunks, held in an in-memory SQLite
//! FTS5 table and ranked with FTS5's built-in `bm25()`.
//!
//! ```text
//! chunks (fts5)
//!   text       tokenized, searchable
//!   source     UNINDEXED
//!   rowid      indexing order, breaks score ties
//! ```

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, params};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::{debug, info};

use super::{Document, RetrievalError, RetrievedChunk, Retriever};

const SCHEMA: &str = "CREATE VIRTUAL TABLE chunks USING fts5(text, source UNINDEXED);";

pub struct KeywordIndex {
    // `Connection` is `Send` but not `Sync`.
    conn: Mutex<Connection>,
    len: usize,
}

impl KeywordIndex {
    /// Split `documents` into windows of at most `chunk_size` characters with
    /// `chunk_overlap` characters of overlap, then index every chunk.
    pub fn build(
        documents: &[Document],
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Self, RetrievalError> {
        if chunk_size == 0 {
            return Err(RetrievalError::Splitter("chunk_size must be > 0".into()));
        }
        let config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|e| RetrievalError::Splitter(e.to_string()))?;
        let splitter = TextSplitter::new(config);

        let mut conn = Connection::open_in_memory()
            .map_err(|e| RetrievalError::Index(format!("open in-memory database: {e}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| RetrievalError::Index(format!("initialize schema: {e}")))?;

        let tx = conn
            .transaction()
            .map_err(|e| RetrievalError::Index(format!("begin transaction: {e}")))?;
        let mut len = 0usize;
        {
            let mut insert = tx
                .prepare("INSERT INTO chunks (rowid, text, source) VALUES (?1, ?2, ?3)")
                .map_err(|e| RetrievalError::Index(format!("prepare insert: {e}")))?;
            for doc in documents {
                for text in splitter.chunks(&doc.text) {
                    if text.trim().is_empty() {
                        continue;
                    }
                    len += 1;
                    insert
                        .execute(params![len as i64, text, doc.source])
                        .map_err(|e| RetrievalError::Index(format!("insert chunk from {}: {e}", doc.source)))?;
                }
            }
        }
        tx.commit()
            .map_err(|e| RetrievalError::Index(format!("commit chunks: {e}")))?;

        info!(
            documents = documents.len(),
            chunks = len,
            chunk_size,
            chunk_overlap,
            "keyword index built"
        );

        Ok(Self { conn: Mutex::new(conn), len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Retriever for KeywordIndex {
    /// Chunks sharing no term with the query are never returned. Equal scores
    /// keep indexing order.
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let Some(fts_query) = match_any_term(query) else {
            return Ok(Vec::new());
        };
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn();
        let mut stmt = conn
            .prepare_cached(
                "SELECT text, source, bm25(chunks) AS rank
                 FROM chunks
                 WHERE chunks MATCH ?1
                 ORDER BY rank, rowid
                 LIMIT ?2",
            )
            .map_err(|e| RetrievalError::Index(format!("prepare search: {e}")))?;

        let hits = stmt
            .query_map(params![fts_query, top_k as i64], |row| {
                // bm25() is negative; lower is better.
                let rank: f64 = row.get(2)?;
                Ok(RetrievedChunk { text: row.get(0)?, source: row.get(1)?, score: (-rank) as f32 })
            })
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|e| RetrievalError::Index(format!("search {fts_query:?}: {e}")))?;

        debug!(query = %fts_query, hits = hits.len(), "retrieval");
        Ok(hits)
    }
}

/// Turn free text into an FTS5 query matching any of its terms. Terms are
/// quoted so words like `NEAR` or `AND` are never read as query syntax.
/// `None` when the text has no terms at all.
fn match_any_term(query: &str) -> Option<String> {
    let mut seen = HashSet::new();
    let terms: Vec<String> = tokenize(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .map(|t| format!("\"{t}\""))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" OR "))
}

/// Lowercase alphanumeric runs; single characters are dropped.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}
