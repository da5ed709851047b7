//! Core data models shared by the retrieval pipeline.

use serde::Serialize;

/// A topic-labelled span of extracted document text, before ordinals are
/// assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub topic: String,
    pub text: String,
}

impl Section {
    pub fn new(topic: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            text: text.into(),
        }
    }
}

/// One retrievable unit of document content.
///
/// `id` is the chunk's ordinal within the index build it belongs to. The
/// whole chunk set is replaced on rebuild, so ids are only stable within a
/// single build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub id: usize,
    pub topic: String,
    pub text: String,
}

impl Chunk {
    /// Text submitted to the embedder: topic line followed by the body.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.topic, self.text)
    }
}
