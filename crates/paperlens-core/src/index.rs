//! Immutable in-memory nearest-neighbour store for one document.
//!
//! A [`VectorIndex`] is built once from a complete chunk set and never
//! mutated afterwards. Rebuilding a document means constructing a new
//! index; readers holding the old one keep a consistent view until they
//! drop it. Search is brute-force cosine similarity, which is plenty for
//! the few hundred chunks a single paper produces.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::embedding::{cosine_similarity, is_degenerate};
use crate::models::Chunk;

struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// A chunk returned from [`VectorIndex::nearest`] with its similarity.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Vector store bound to exactly one chunk set.
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dims: usize,
}

impl VectorIndex {
    /// An index with no chunks. Every query against it finds nothing.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            dims: 0,
        }
    }

    /// Pair each chunk with its embedding.
    ///
    /// # Errors
    ///
    /// Fails if the counts differ, if any vector is degenerate (empty, all
    /// zero, non-finite), or if vectors disagree on dimensionality.
    pub fn new(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != vectors.len() {
            bail!(
                "expected {} vectors for {} chunks, got {}",
                chunks.len(),
                chunks.len(),
                vectors.len()
            );
        }

        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        let mut entries = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            if is_degenerate(&vector) {
                bail!("degenerate embedding for chunk {}", chunk.id);
            }
            if vector.len() != dims {
                bail!(
                    "embedding for chunk {} has {} dims, expected {}",
                    chunk.id,
                    vector.len(),
                    dims
                );
            }
            entries.push(IndexEntry { chunk, vector });
        }

        Ok(Self { entries, dims })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimensionality, `0` for an empty index.
    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Best cosine match for `query`, or `None` when the index is empty.
    ///
    /// Ties go to the chunk with the lowest ordinal.
    pub fn nearest(&self, query: &[f32]) -> Option<ScoredChunk> {
        let mut best: Option<(&IndexEntry, f32)> = None;
        for entry in &self.entries {
            let sim = cosine_similarity(query, &entry.vector);
            match best {
                Some((_, best_sim)) if sim <= best_sim => {}
                _ => best = Some((entry, sim)),
            }
        }
        best.map(|(entry, score)| ScoredChunk {
            chunk: entry.chunk.clone(),
            score,
        })
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::empty()
    }
}
