//! Document fetching into the artifact directory.
//!
//! A [`Fetcher`] turns a source reference (URL or local path) into a file
//! staged in the [`ArtifactStore`]. The staged file is registered with the
//! store so the eviction sweep can reclaim it later.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::artifacts::ArtifactStore;

/// Stage a document locally.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `source_ref` into `store` and return the staged path.
    ///
    /// On failure nothing is left behind in the store.
    async fn fetch(&self, source_ref: &str, store: &ArtifactStore) -> Result<PathBuf>;
}

/// Fetches `http(s)` URLs with reqwest and copies local files.
///
/// arXiv abstract pages (`https://arxiv.org/abs/<id>`) are rewritten to
/// their PDF links before download.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("paperlens/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Download of {} failed with HTTP {}", url, status);
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            bail!("Download of {} returned an empty body", url);
        }
        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        debug!(url, bytes = bytes.len(), dest = %dest.display(), "downloaded document");
        Ok(())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, source_ref: &str, store: &ArtifactStore) -> Result<PathBuf> {
        let source_ref = source_ref.trim();
        if source_ref.is_empty() {
            bail!("source reference must not be empty");
        }

        if is_remote(source_ref) {
            let url = normalize_url(source_ref);
            let dest = store.allocate(&extension_for(&url));
            if let Err(e) = self.download(&url, &dest).await {
                discard_partial(store, &dest);
                return Err(e);
            }
            store.register(&dest)?;
            Ok(dest)
        } else {
            copy_local(source_ref, store).await
        }
    }
}

/// Copies local files into the store; rejects URLs. Used by the CLI when no
/// network access is wanted, and in tests.
pub struct LocalFetcher;

#[async_trait]
impl Fetcher for LocalFetcher {
    async fn fetch(&self, source_ref: &str, store: &ArtifactStore) -> Result<PathBuf> {
        if is_remote(source_ref) {
            bail!("remote sources are not supported: {}", source_ref);
        }
        copy_local(source_ref, store).await
    }
}

async fn copy_local(source_ref: &str, store: &ArtifactStore) -> Result<PathBuf> {
    let src = PathBuf::from(source_ref.strip_prefix("file://").unwrap_or(source_ref));
    if !src.is_file() {
        bail!("No such file: {}", src.display());
    }
    let ext = src
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    let dest = store.allocate(&ext);
    if let Err(e) = tokio::fs::copy(&src, &dest).await {
        discard_partial(store, &dest);
        return Err(e).with_context(|| format!("Failed to copy {}", src.display()));
    }
    store.register(&dest)?;
    Ok(dest)
}

fn discard_partial(store: &ArtifactStore, dest: &Path) {
    if let Err(e) = store.purge(dest) {
        warn!(path = %dest.display(), error = %e, "failed to remove partial download");
    }
}

fn is_remote(source_ref: &str) -> bool {
    source_ref.starts_with("http://") || source_ref.starts_with("https://")
}

/// Rewrite arXiv abstract links to the PDF they describe.
pub fn normalize_url(url: &str) -> String {
    for host in ["://arxiv.org/abs/", "://www.arxiv.org/abs/", "://export.arxiv.org/abs/"] {
        if let Some(pos) = url.find(host) {
            let id = &url[pos + host.len()..];
            let id = id.split(['?', '#']).next().unwrap_or(id);
            let scheme = &url[..pos];
            let domain = &host[3..host.len() - "abs/".len()];
            return format!("{}://{}pdf/{}", scheme, domain, id);
        }
    }
    url.to_string()
}

/// File extension to stage a URL under. Defaults to `pdf`.
fn extension_for(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((_, ext)) if matches!(ext, "pdf" | "docx" | "txt" | "md") => ext.to_string(),
        _ => "pdf".to_string(),
    }
}
