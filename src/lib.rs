//! # PaperLens
//!
//! Backend for reading research papers with an AI assistant: load one
//! document at a time, ask questions against it, and turn generated bullet
//! outlines into mind-map graphs.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌──────────────┐
//! │  Fetcher  │──▶│ Extractor │──▶│ Embedder  │──▶│ DocumentSlot │
//! │ HTTP/file │   │ PDF/DOCX  │   │ + retries │   │ (published)  │
//! └─────┬─────┘   └───────────┘   └───────────┘   └──────┬───────┘
//!       │                                                │
//!       ▼                                                ▼
//! ┌──────────────┐   sweeper (periodic)           ┌─────────────┐
//! │ArtifactStore │◀──────────────────────────────│ HTTP / CLI  │
//! └──────────────┘   spares the active file       └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Load, query, and embedding error types |
//! | [`artifacts`] | Staged document files and age-based eviction |
//! | [`fetch`] | Download or copy a document into the artifact store |
//! | [`extract`] | PDF / DOCX / text extraction into topic sections |
//! | [`embedding`] | Embedding providers and the retry wrapper |
//! | [`completion`] | Text completion providers |
//! | [`retrieval`] | Build and query the per-document vector index |
//! | [`session`] | The active-document slot and the eviction sweeper |
//! | [`server`] | HTTP API |
//!
//! Pure logic (sectioning, the vector index, the outline compiler) lives in
//! the `paperlens-core` crate.

pub mod artifacts;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod retrieval;
pub mod server;
pub mod session;
