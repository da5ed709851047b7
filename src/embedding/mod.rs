//! Embedding capability: trait, providers, and the retry/timeout wrapper.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]** — always fails; used when embeddings are not configured.
//! - **[`GeminiEmbedder`]** — Google `batchEmbedContents`, with asymmetric
//!   `RETRIEVAL_DOCUMENT` / `RETRIEVAL_QUERY` task types.
//! - **[`OpenAIEmbedder`]** — OpenAI-compatible `/v1/embeddings`.
//! - **[`OllamaEmbedder`]** — a local Ollama instance's `/api/embed`.
//! - **`LocalEmbedder`** — fastembed, behind the `local-embeddings` feature.
//!
//! Providers make exactly one HTTP attempt per call and classify failures
//! as [`EmbedError::Transient`] or [`EmbedError::Permanent`].
//! [`RetryingEmbedder`] adds a per-attempt timeout and bounded retries.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited), 5xx, connect errors, timeouts → retry
//! - Other HTTP 4xx, malformed responses → fail immediately
//! - Backoff: `base`, `2 × base`, `4 × base`, ... (capped at `32 × base`)
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use paperlens::config::EmbeddingConfig;
//! # use paperlens::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

#[cfg(feature = "local-embeddings")]
mod local;

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

use anyhow::{bail, Result};
use async_trait::async_trait;
use paperlens_core::embedding::EmbedMode;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// Turns texts into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-004"`).
    fn model_name(&self) -> &str;

    /// Embed `texts` for the given side of the retrieval model.
    ///
    /// Returns one vector per input text, in input order.
    async fn embed(&self, texts: &[String], mode: EmbedMode)
        -> Result<Vec<Vec<f32>>, EmbedError>;
}

// ============ Disabled ============

/// Used when `embedding.provider = "disabled"`. Every call fails permanently.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _texts: &[String], _mode: EmbedMode) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Permanent(
            "Embedding provider is disabled".to_string(),
        ))
    }
}

// ============ Retry / timeout ============

/// Bounded retry policy around a single embedder call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// First backoff delay; doubles per retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
            base_delay: Duration::from_secs(1),
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }
}

/// Wraps an embedder with a timeout per attempt and retries for transient
/// failures only.
pub struct RetryingEmbedder {
    inner: Arc<dyn Embedder>,
    policy: RetryPolicy,
}

impl RetryingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Embedder for RetryingEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn embed(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut last_err = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.policy.delay(attempt)).await;
            }

            let result =
                match tokio::time::timeout(self.policy.timeout, self.inner.embed(texts, mode)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(EmbedError::Transient(format!(
                        "embedding call timed out after {:?}",
                        self.policy.timeout
                    ))),
                };

            match result {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        model = self.inner.model_name(),
                        error = %e,
                        "retrying embedding request"
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err
            .unwrap_or_else(|| EmbedError::Transient("embedding failed after retries".to_string())))
    }
}

// ============ Gemini ============

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Reads the API key from `GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`.
pub fn gemini_api_key() -> Result<String> {
    std::env::var("GEMINI_API_KEY")
        .or_else(|_| std::env::var("GOOGLE_API_KEY"))
        .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))
}

/// Google Generative Language embeddings.
///
/// Document chunks are embedded with `RETRIEVAL_DOCUMENT` and questions
/// with `RETRIEVAL_QUERY`.
pub struct GeminiEmbedder {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Gemini provider"))?;
        let model = model.trim_start_matches("models/").to_string();
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            model,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key: gemini_api_key()?,
        })
    }
}

fn gemini_task_type(mode: EmbedMode) -> &'static str {
    match mode {
        EmbedMode::Document => "RETRIEVAL_DOCUMENT",
        EmbedMode::Query => "RETRIEVAL_QUERY",
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>, EmbedError> {
        let model_ref = format!("models/{}", self.model);
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": model_ref,
                    "content": { "parts": [{ "text": t }] },
                    "taskType": gemini_task_type(mode),
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });

        let request = self
            .client
            .post(format!(
                "{}/{}:batchEmbedContents",
                self.base_url, model_ref
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        let json = send_json("Gemini", request).await?;
        let vectors = parse_gemini_response(&json)?;
        check_count("Gemini", texts.len(), vectors)
    }
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            EmbedError::Permanent("Invalid Gemini response: missing embeddings array".to_string())
        })?;

    embeddings
        .iter()
        .map(|item| {
            let values = item
                .get("values")
                .and_then(|v| v.as_array())
                .ok_or_else(|| {
                    EmbedError::Permanent("Invalid Gemini response: missing values".to_string())
                })?;
            json_floats("Gemini", values)
        })
        .collect()
}

// ============ OpenAI ============

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI embeddings (or any OpenAI-compatible gateway via `embedding.url`).
///
/// Requires the `OPENAI_API_KEY` environment variable. The model is
/// symmetric, so the embed mode is ignored.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    model: String,
    dims: Option<usize>,
    base_url: String,
    api_key: String,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            model,
            dims: config.dims,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String], _mode: EmbedMode) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        if let Some(dims) = self.dims {
            body["dimensions"] = serde_json::json!(dims);
        }

        let request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        let json = send_json("OpenAI", request).await?;
        let vectors = parse_openai_response(&json)?;
        check_count("OpenAI", texts.len(), vectors)
    }
}

/// Extracts `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            EmbedError::Permanent("Invalid OpenAI response: missing data array".to_string())
        })?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                EmbedError::Permanent("Invalid OpenAI response: missing embedding".to_string())
            })?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, json_floats("OpenAI", embedding)?));
    }
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embeddings from a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    url: String,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String], _mode: EmbedMode) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body);
        let json = send_json("Ollama", request).await?;
        let vectors = parse_ollama_response(&json)?;
        check_count("Ollama", texts.len(), vectors)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            EmbedError::Permanent("Invalid Ollama response: missing embeddings array".to_string())
        })?;

    embeddings
        .iter()
        .map(|embedding| {
            let values = embedding.as_array().ok_or_else(|| {
                EmbedError::Permanent(
                    "Invalid Ollama response: embedding is not an array".to_string(),
                )
            })?;
            json_floats("Ollama", values)
        })
        .collect()
}

// ============ Shared HTTP plumbing ============

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

async fn send_json(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, EmbedError> {
    let response = request
        .send()
        .await
        .map_err(|e| EmbedError::from_reqwest(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(EmbedError::from_status(provider, status, &body_text));
    }

    response
        .json()
        .await
        .map_err(|e| EmbedError::Permanent(format!("{} returned invalid JSON: {}", provider, e)))
}

/// Non-numeric components reject the whole response.
fn json_floats(provider: &str, values: &[serde_json::Value]) -> Result<Vec<f32>, EmbedError> {
    values
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                EmbedError::Permanent(format!(
                    "Invalid {} response: non-numeric embedding value {}",
                    provider, v
                ))
            })
        })
        .collect()
}

fn check_count(
    provider: &str,
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if vectors.len() != expected {
        return Err(EmbedError::Permanent(format!(
            "{} returned {} embeddings for {} inputs",
            provider,
            vectors.len(),
            expected
        )));
    }
    Ok(vectors)
}

/// Create the configured embedder, wrapped in a [`RetryingEmbedder`].
///
/// # Supported Providers
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"gemini"` | [`GeminiEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let inner: Arc<dyn Embedder> = match config.provider.as_str() {
        "disabled" => return Ok(Arc::new(DisabledEmbedder)),
        "gemini" => Arc::new(GeminiEmbedder::new(config)?),
        "openai" => Arc::new(OpenAIEmbedder::new(config)?),
        "ollama" => Arc::new(OllamaEmbedder::new(config)?),
        #[cfg(feature = "local-embeddings")]
        "local" => Arc::new(LocalEmbedder::new(config)?),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    };
    Ok(Arc::new(RetryingEmbedder::new(
        inner,
        RetryPolicy::from_config(config),
    )))
}
