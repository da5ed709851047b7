//! Retrieval index: embed a chunk set once, then answer nearest-chunk queries.
//!
//! [`build`] embeds every chunk in [`EmbedMode::Document`] and returns a new
//! [`IndexHandle`]. Handles are never mutated; a rebuild produces a fresh
//! handle, and queries already running against the old one finish against
//! the old chunk set.

use std::fmt;
use std::sync::Arc;

use paperlens_core::embedding::EmbedMode;
use paperlens_core::index::{ScoredChunk, VectorIndex};
use paperlens_core::models::Chunk;
use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{EmbedError, LoadError, QueryError};

/// Shared, immutable reference to one built index.
#[derive(Clone)]
pub struct IndexHandle(Arc<VectorIndex>);

impl IndexHandle {
    /// A handle over zero chunks. Every query returns [`QueryError::NotFound`].
    pub fn empty() -> Self {
        Self(Arc::new(VectorIndex::empty()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.0.chunks()
    }

    /// True if both handles share the same underlying index.
    pub fn ptr_eq(&self, other: &IndexHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexHandle")
            .field("chunks", &self.0.len())
            .field("dims", &self.0.dims())
            .finish()
    }
}

/// Embed `chunks` and build a new index bound to exactly that set.
///
/// # Errors
///
/// [`LoadError::EmbeddingUnavailable`] if the embedder fails, or returns no
/// vectors or degenerate vectors for a non-empty input.
pub async fn build(embedder: &dyn Embedder, chunks: Vec<Chunk>) -> Result<IndexHandle, LoadError> {
    if chunks.is_empty() {
        return Ok(IndexHandle::empty());
    }

    let texts: Vec<String> = chunks.iter().map(Chunk::embedding_text).collect();
    let vectors = embedder.embed(&texts, EmbedMode::Document).await?;
    if vectors.is_empty() {
        return Err(LoadError::EmbeddingUnavailable(format!(
            "{} returned zero vectors for {} chunks",
            embedder.model_name(),
            chunks.len()
        )));
    }

    let index = VectorIndex::new(chunks, vectors)
        .map_err(|e| LoadError::EmbeddingUnavailable(e.to_string()))?;
    debug!(chunks = index.len(), dims = index.dims(), "built vector index");
    Ok(IndexHandle(Arc::new(index)))
}

/// Return the chunk nearest to `text`.
///
/// An empty index answers [`QueryError::NotFound`] without calling the
/// embedder.
pub async fn query(
    embedder: &dyn Embedder,
    handle: &IndexHandle,
    text: &str,
) -> Result<ScoredChunk, QueryError> {
    if handle.is_empty() {
        return Err(QueryError::NotFound);
    }

    let vectors = embedder
        .embed(&[text.to_string()], EmbedMode::Query)
        .await?;
    let vector = vectors.into_iter().next().ok_or_else(|| {
        QueryError::from(EmbedError::Permanent(
            "empty embedding response for query".to_string(),
        ))
    })?;
    if paperlens_core::embedding::is_degenerate(&vector) {
        return Err(QueryError::EmbeddingUnavailable(
            "degenerate query embedding".to_string(),
        ));
    }

    handle.0.nearest(&vector).ok_or(QueryError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Maps keywords to axes; records the modes it was called with.
    struct KeywordEmbedder {
        modes: Mutex<Vec<EmbedMode>>,
        zero: bool,
    }

    impl KeywordEmbedder {
        fn new() -> Self {
            Self {
                modes: Mutex::new(Vec::new()),
                zero: false,
            }
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }

        async fn embed(
            &self,
            texts: &[String],
            mode: EmbedMode,
        ) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.modes.lock().unwrap().push(mode);
            Ok(texts
                .iter()
                .map(|t| {
                    if self.zero {
                        return vec![0.0, 0.0];
                    }
                    let t = t.to_lowercase();
                    vec![
                        if t.contains("widget") { 1.0 } else { 0.1 },
                        if t.contains("gadget") { 1.0 } else { 0.1 },
                    ]
                })
                .collect())
        }
    }

    fn chunk(id: usize, topic: &str, text: &str) -> Chunk {
        Chunk {
            id,
            topic: topic.to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_query_returns_nearest_chunk() {
        let embedder = KeywordEmbedder::new();
        let handle = build(
            &embedder,
            vec![
                chunk(0, "Widgets", "All about widgets."),
                chunk(1, "Gadgets", "All about gadgets."),
            ],
        )
        .await
        .unwrap();
        assert_eq!(handle.len(), 2);

        let hit = query(&embedder, &handle, "tell me about gadget design")
            .await
            .unwrap();
        assert_eq!(hit.chunk.id, 1);

        let modes = embedder.modes.lock().unwrap().clone();
        assert_eq!(modes, vec![EmbedMode::Document, EmbedMode::Query]);
    }

    #[tokio::test]
    async fn test_empty_index_is_not_found_without_embedding() {
        let embedder = KeywordEmbedder::new();
        let err = query(&embedder, &IndexHandle::empty(), "anything")
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::NotFound));
        assert!(embedder.modes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_degenerate_vectors_fail_build() {
        let embedder = KeywordEmbedder {
            modes: Mutex::new(Vec::new()),
            zero: true,
        };
        let err = build(&embedder, vec![chunk(0, "A", "a")]).await;
        assert!(matches!(err, Err(LoadError::EmbeddingUnavailable(_))));
    }

    #[tokio::test]
    async fn test_handle_debug_shows_shape() {
        let embedder = KeywordEmbedder::new();
        let handle = build(&embedder, vec![chunk(0, "Widgets", "w")]).await.unwrap();
        assert_eq!(format!("{:?}", handle), "IndexHandle { chunks: 1, dims: 2 }");
    }

    #[tokio::test]
    async fn test_rebuild_returns_new_handle() {
        let embedder = KeywordEmbedder::new();
        let first = build(&embedder, vec![chunk(0, "Widgets", "w")]).await.unwrap();
        let second = build(&embedder, vec![chunk(0, "Gadgets", "g")]).await.unwrap();
        assert!(!first.ptr_eq(&second));
        assert_eq!(first.chunks().next().unwrap().topic, "Widgets");
    }
}
