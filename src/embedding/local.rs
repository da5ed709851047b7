//! Local embeddings via fastembed (ONNX Runtime, bundled).
//!
//! The model is downloaded from Hugging Face on first use and cached; after
//! that no network calls are made. E5-family models expect `query: ` and
//! `passage: ` prefixes, which are applied from the embed mode.

use anyhow::{bail, Result};
use async_trait::async_trait;
use paperlens_core::embedding::EmbedMode;
use std::sync::{Arc, Mutex};

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

const DEFAULT_LOCAL_MODEL: &str = "multilingual-e5-small";

pub struct LocalEmbedder {
    model_name: String,
    model: fastembed::EmbeddingModel,
    /// Initialized lazily on the first call; `TextEmbedding::embed` needs `&mut`.
    loaded: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
        let model = config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            model,
            loaded: Arc::new(Mutex::new(None)),
        })
    }

    fn uses_e5_prefixes(&self) -> bool {
        self.model_name.contains("e5")
    }
}

fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>, EmbedError> {
        let prefix = match (self.uses_e5_prefixes(), mode) {
            (false, _) => "",
            (true, EmbedMode::Query) => "query: ",
            (true, EmbedMode::Document) => "passage: ",
        };
        let inputs: Vec<String> = texts.iter().map(|t| format!("{}{}", prefix, t)).collect();
        let loaded = Arc::clone(&self.loaded);
        let model = self.model.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = loaded
                .lock()
                .map_err(|_| EmbedError::Permanent("local model lock poisoned".to_string()))?;
            if guard.is_none() {
                let init = fastembed::InitOptions::new(model).with_show_download_progress(false);
                let text_embedding = fastembed::TextEmbedding::try_new(init).map_err(|e| {
                    EmbedError::Permanent(format!(
                        "Failed to initialize local embedding model: {}",
                        e
                    ))
                })?;
                *guard = Some(text_embedding);
            }
            match guard.as_mut() {
                Some(text_embedding) => text_embedding
                    .embed(inputs, None)
                    .map_err(|e| EmbedError::Permanent(format!("Local embedding failed: {}", e))),
                None => Err(EmbedError::Permanent(
                    "local model not initialized".to_string(),
                )),
            }
        })
        .await
        .map_err(|e| EmbedError::Permanent(format!("embedding task failed: {}", e)))?
    }
}
