//! # PaperLens Core
//!
//! Runtime-free logic for PaperLens: the chunk data model, sectioning of
//! extracted document text, the immutable vector index that backs a
//! loaded document, and the outline-to-graph compiler.
//!
//! This crate contains no tokio, filesystem I/O, or network code. The
//! `paperlens` app crate supplies embedders, fetchers, and the session
//! manager that publishes a built index.

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
pub mod outline;
