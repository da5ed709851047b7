//! Error taxonomy for document loading, querying, and embedding.
//!
//! Load and query failures are typed so the HTTP layer can map them to
//! status codes. Capability implementations use `anyhow` internally and are
//! converted here at the session boundary.

use thiserror::Error;

/// Why a `load_document` call did not publish a new slot.
///
/// The previously published slot, if any, is untouched in every case.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
}

impl LoadError {
    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            LoadError::FetchFailed(_) => "fetch_failed",
            LoadError::ExtractionFailed(_) => "extraction_failed",
            LoadError::EmbeddingUnavailable(_) => "embedding_unavailable",
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    /// No document is loaded, or the loaded index holds no chunks.
    #[error("no matching passage found")]
    NotFound,
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
}

/// Failure reported by an [`Embedder`](crate::embedding::Embedder).
///
/// Only [`EmbedError::Transient`] failures are retried.
#[derive(Debug, Clone, Error)]
pub enum EmbedError {
    #[error("transient embedding failure: {0}")]
    Transient(String),
    #[error("embedding failure: {0}")]
    Permanent(String),
}

impl EmbedError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EmbedError::Transient(_))
    }

    /// Classify a non-success HTTP status: 429 and 5xx are worth retrying.
    pub fn from_status(provider: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let msg = format!("{} API error {}: {}", provider, status, body);
        if status.as_u16() == 429 || status.is_server_error() {
            EmbedError::Transient(msg)
        } else {
            EmbedError::Permanent(msg)
        }
    }

    /// Network-level failures (connect, timeout) are transient; anything
    /// else reqwest reports (bad URL, body decode) is not.
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        let msg = format!("{} request failed: {}", provider, err);
        if err.is_connect() || err.is_timeout() || err.is_request() {
            EmbedError::Transient(msg)
        } else {
            EmbedError::Permanent(msg)
        }
    }
}

impl From<EmbedError> for LoadError {
    fn from(err: EmbedError) -> Self {
        LoadError::EmbeddingUnavailable(err.to_string())
    }
}

impl From<EmbedError> for QueryError {
    fn from(err: EmbedError) -> Self {
        QueryError::EmbeddingUnavailable(err.to_string())
    }
}
