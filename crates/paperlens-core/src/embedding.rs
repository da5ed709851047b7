//! Embedding modes and vector utilities.
//!
//! Concrete embedder implementations (Gemini, OpenAI, Ollama, fastembed)
//! live in the `paperlens` app crate. This module only defines the
//! asymmetric [`EmbedMode`] and pure helpers used by the vector index.

use serde::{Deserialize, Serialize};

/// Which side of an asymmetric retrieval model a text is embedded for.
///
/// Chunks are embedded as [`EmbedMode::Document`] at build time and user
/// questions as [`EmbedMode::Query`]. Mixing them up degrades match quality
/// but is not a correctness error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedMode {
    Document,
    Query,
}

impl EmbedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedMode::Document => "document",
            EmbedMode::Query => "query",
        }
    }
}

/// True if the vector cannot take part in cosine similarity: empty, all
/// zeros, or containing non-finite values.
pub fn is_degenerate(vec: &[f32]) -> bool {
    vec.is_empty() || vec.iter().any(|v| !v.is_finite()) || vec.iter().all(|v| *v == 0.0)
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
