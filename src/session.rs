//! The single active-document slot.
//!
//! [`SessionManager`] owns at most one published [`DocumentSlot`]. Loading
//! a document builds a complete new slot off to the side and publishes it
//! with one pointer swap; readers clone the `Arc` under a brief read lock
//! and then work against that snapshot with no further locking. A failed
//! load leaves the previous slot in place and purges the file it staged.
//!
//! Concurrent loads are not serialized: each runs to completion and the
//! last one to publish wins.
//!
//! A background sweeper ([`SessionManager::spawn_sweeper`]) periodically
//! evicts aged-out artifacts. It reads the active path afresh for every
//! deletion decision, so it never deletes the published file.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use paperlens_core::chunk::chunks_from_sections;
use paperlens_core::index::ScoredChunk;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::artifacts::{ArtifactStore, SweepReport};
use crate::embedding::Embedder;
use crate::error::{LoadError, QueryError};
use crate::extract::Extractor;
use crate::fetch::Fetcher;
use crate::retrieval::{self, IndexHandle};

/// A published document: the staged file and the index built from it.
///
/// Immutable once published; replaced wholesale by the next load.
#[derive(Debug)]
pub struct DocumentSlot {
    pub path: PathBuf,
    pub source_ref: String,
    pub index: IndexHandle,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of the session for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SlotStatus {
    pub path: Option<PathBuf>,
    pub source_ref: Option<String>,
    pub ready: bool,
    /// Loads currently in flight.
    pub loading: usize,
    pub chunk_count: usize,
    pub created_at: Option<DateTime<Utc>>,
}

pub struct SessionManager {
    store: Arc<ArtifactStore>,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    embedder: Arc<dyn Embedder>,
    active: RwLock<Option<Arc<DocumentSlot>>>,
    loading: AtomicUsize,
}

/// Decrements the in-flight counter when a load ends, however it ends.
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SessionManager {
    pub fn new(
        store: Arc<ArtifactStore>,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            store,
            fetcher,
            extractor,
            embedder,
            active: RwLock::new(None),
            loading: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Fetch, extract, and index `source_ref`, then publish it as the
    /// active slot.
    ///
    /// On any failure the previously published slot stays active and the
    /// file staged by this call is deleted.
    pub async fn load_document(&self, source_ref: &str) -> Result<Arc<DocumentSlot>, LoadError> {
        let _loading = LoadingGuard::enter(&self.loading);

        let path = self
            .fetcher
            .fetch(source_ref, &self.store)
            .await
            .map_err(|e| LoadError::FetchFailed(format!("{:#}", e)))?;

        // Keep the sweeper off the file until it is published or purged.
        let _pin = self.store.pin(&path);

        match self.build_slot(source_ref, path.clone()).await {
            Ok(slot) => {
                let slot = Arc::new(slot);
                let previous = self.publish(Arc::clone(&slot));
                info!(
                    source = source_ref,
                    path = %slot.path.display(),
                    chunks = slot.index.len(),
                    replaced = ?previous.as_ref().map(|p| p.path.display().to_string()),
                    "published document"
                );
                Ok(slot)
            }
            Err(e) => {
                warn!(source = source_ref, error = %e, "document load failed, keeping previous slot");
                if let Err(purge_err) = self.store.purge(&path) {
                    warn!(path = %path.display(), error = %purge_err, "failed to purge staged file");
                }
                Err(e)
            }
        }
    }

    async fn build_slot(&self, source_ref: &str, path: PathBuf) -> Result<DocumentSlot, LoadError> {
        let sections = self
            .extractor
            .extract(&path)
            .await
            .map_err(|e| LoadError::ExtractionFailed(format!("{:#}", e)))?;
        if sections.is_empty() {
            return Err(LoadError::ExtractionFailed(format!(
                "no content extracted from {}",
                path.display()
            )));
        }

        let chunks = chunks_from_sections(sections);
        let index = retrieval::build(self.embedder.as_ref(), chunks).await?;

        Ok(DocumentSlot {
            path,
            source_ref: source_ref.to_string(),
            index,
            created_at: Utc::now(),
        })
    }

    /// Swap in `slot`, returning the slot it replaced.
    fn publish(&self, slot: Arc<DocumentSlot>) -> Option<Arc<DocumentSlot>> {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        active.replace(slot)
    }

    /// Snapshot of the published slot, if any.
    pub fn current_slot(&self) -> Option<Arc<DocumentSlot>> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.current_slot().map(|slot| slot.path.clone())
    }

    pub fn status(&self) -> SlotStatus {
        let slot = self.current_slot();
        SlotStatus {
            path: slot.as_ref().map(|s| s.path.clone()),
            source_ref: slot.as_ref().map(|s| s.source_ref.clone()),
            ready: slot.is_some(),
            loading: self.loading.load(Ordering::SeqCst),
            chunk_count: slot.as_ref().map(|s| s.index.len()).unwrap_or(0),
            created_at: slot.as_ref().map(|s| s.created_at),
        }
    }

    /// Nearest chunk in the active document.
    pub async fn query(&self, text: &str) -> Result<ScoredChunk, QueryError> {
        let slot = self.current_slot().ok_or(QueryError::NotFound)?;
        retrieval::query(self.embedder.as_ref(), &slot.index, text).await
    }

    /// Run one eviction pass, sparing the active document.
    pub fn sweep_now(&self, max_age: Duration) -> SweepReport {
        self.store
            .evict_older_than(max_age, || self.current_path())
    }

    /// Sweep every `interval` until the returned handle is aborted. The
    /// first sweep runs one interval after spawning.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, max_age: Duration) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let session = Arc::clone(&session);
                if let Err(e) =
                    tokio::task::spawn_blocking(move || session.sweep_now(max_age)).await
                {
                    warn!(error = %e, "artifact sweep task failed, retrying next tick");
                }
            }
        })
    }
}
