//! Flat (exhaustive) nearest-neighbor index over chunk embeddings.
//!
//! Searches compare the query against every stored vector, so a search costs
//! O(n * D). That is fine for the small-to-moderate corpora this crate targets;
//! larger corpora would need an approximate structure.
//!
//! Concurrency: embedding happens outside the lock. The write lock is only held
//! while a fully embedded and validated batch is appended, so concurrent searches
//! never observe chunks without their vectors, and a failed add leaves the index
//! untouched.

use std::cmp::Ordering;

use dq_core::chunking::ChunkingParams;
use dq_core::domain::{Chunk, IndexEntry, Vector};
use dq_core::error::{codes, AppError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embeddings::{embed_batch, Embedder};

pub mod distance;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub distance: f32,
}

#[derive(Debug, Default)]
struct FlatEntries {
    chunks: Vec<Chunk>,
    vectors: Vec<Vector>,
    dims: Option<usize>,
    next_source_index: u64,
}

impl FlatEntries {
    fn check_dims(&self, dims: usize) -> Result<(), AppError> {
        match self.dims {
            Some(d) if d != dims => Err(AppError::new(
                codes::INDEX_DIMENSION_MISMATCH,
                "Embedding dimension does not match index dimension",
            )
            .with_details(format!("index_dims={d}; got={dims}"))),
            _ => Ok(()),
        }
    }

    fn append(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vector>, dims: usize) {
        debug_assert_eq!(chunks.len(), vectors.len());
        if chunks.is_empty() {
            return;
        }
        self.dims.get_or_insert(dims);
        for c in &chunks {
            self.next_source_index = self.next_source_index.max(c.source_index.saturating_add(1));
        }
        self.chunks.extend(chunks);
        self.vectors.extend(vectors);
    }
}

#[derive(Debug, Default)]
pub struct VectorIndex {
    inner: RwLock<FlatEntries>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension, fixed by the first successful add.
    pub fn dims(&self) -> Option<usize> {
        self.inner.read().dims
    }

    /// Copy of every entry in insertion order.
    pub fn entries(&self) -> Vec<IndexEntry> {
        let inner = self.inner.read();
        inner
            .chunks
            .iter()
            .zip(inner.vectors.iter())
            .map(|(chunk, vector)| IndexEntry {
                chunk: chunk.clone(),
                vector: vector.clone(),
            })
            .collect()
    }

    /// Embed `chunks` as one batch and append them. Returns the number appended.
    ///
    /// All-or-nothing: on any error the index is unchanged.
    pub fn add(&self, embedder: &dyn Embedder, chunks: Vec<Chunk>) -> Result<usize, AppError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        if let Some(bad) = chunks.iter().find(|c| c.text.trim().is_empty()) {
            return Err(
                AppError::new(codes::INDEX_INVALID_CHUNK, "Chunk text must not be empty")
                    .with_details(format!("chunk_id={}", bad.id)),
            );
        }

        let texts = chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>();
        let (vectors, dims) = embed_batch(embedder, &texts)?;

        let mut inner = self.inner.write();
        inner.check_dims(dims)?;
        let added = chunks.len();
        inner.append(chunks, vectors, dims);
        debug!(added, total = inner.chunks.len(), dims, "index add");
        Ok(added)
    }

    /// Chunk raw documents, embed every chunk as one batch, and append them.
    ///
    /// Chunk ids are positions in the index; `source_index` counts ingested
    /// documents. Documents that produce no chunks do not consume a source index.
    pub fn add_documents(
        &self,
        embedder: &dyn Embedder,
        documents: &[String],
        params: ChunkingParams,
    ) -> Result<Vec<Chunk>, AppError> {
        params.validate()?;

        // (document ordinal among non-empty documents, chunk text)
        let mut drafts: Vec<(u64, String)> = Vec::new();
        let mut ordinal = 0u64;
        for doc in documents {
            let pieces = params.chunk(doc)?;
            if pieces.is_empty() {
                continue;
            }
            drafts.extend(pieces.into_iter().map(|p| (ordinal, p)));
            ordinal += 1;
        }
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let texts = drafts.iter().map(|(_, t)| t.clone()).collect::<Vec<_>>();
        let (vectors, dims) = embed_batch(embedder, &texts)?;

        let mut inner = self.inner.write();
        inner.check_dims(dims)?;
        let base_id = inner.chunks.len() as u64;
        let base_source = inner.next_source_index;
        if base_source.checked_add(ordinal).is_none() {
            return Err(AppError::new(
                codes::INDEX_INVALID_CHUNK,
                "Source index range exhausted",
            )
            .with_details(format!("next_source_index={base_source}; documents={ordinal}")));
        }
        let chunks = drafts
            .into_iter()
            .enumerate()
            .map(|(i, (doc, text))| Chunk::new(base_id + i as u64, text, base_source + doc))
            .collect::<Vec<_>>();
        inner.append(chunks.clone(), vectors, dims);
        info!(
            documents = ordinal,
            chunks = chunks.len(),
            total = inner.chunks.len(),
            "index add_documents"
        );
        Ok(chunks)
    }

    /// The `k` nearest chunks to `query`, ascending by squared Euclidean distance,
    /// ties broken by insertion order. An empty index yields no hits.
    pub fn search(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, AppError> {
        let q = query.trim();
        if q.is_empty() {
            return Err(AppError::new(codes::EMPTY_QUERY, "Query must not be empty"));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let (mut vectors, _) = embed_batch(embedder, &[q.to_string()])?;
        let qv = vectors.pop().ok_or_else(|| {
            AppError::new(codes::EMBEDDINGS_FAILED, "Query embedding missing")
        })?;
        self.search_vector(&qv, k)
    }

    /// Nearest-neighbor search with a precomputed query vector.
    pub fn search_vector(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, AppError> {
        let inner = self.inner.read();
        if k == 0 || inner.chunks.is_empty() {
            return Ok(Vec::new());
        }
        inner.check_dims(query.len())?;

        let mut scored: Vec<(usize, f32)> = inner
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, distance::squared_l2(query, v)))
            .collect();

        let by_distance =
            |a: &(usize, f32), b: &(usize, f32)| -> Ordering { a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)) };
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_distance);
            scored.truncate(k);
        }
        scored.sort_by(by_distance);

        debug!(k, candidates = inner.chunks.len(), hits = scored.len(), "index search");
        Ok(scored
            .into_iter()
            .map(|(i, distance)| SearchHit {
                chunk: inner.chunks[i].clone(),
                distance,
            })
            .collect())
    }
}
