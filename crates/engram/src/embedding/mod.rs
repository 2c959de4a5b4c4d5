//! Text embedding collaborator
//!
//! `Embedder` is the narrow interface the long-term store uses to turn text
//! into vectors. `FastEmbedder` runs a local ONNX model through fastembed.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};

use crate::config::EmbeddingConfig;
use crate::error::{EngramError, Result};

/// Turns text into fixed-size vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector returned by `embed`
    fn dimension(&self) -> usize;
}

#[async_trait]
impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }
}

/// Local embedding model backed by fastembed.
///
/// Inference is CPU-bound, so every call runs on tokio's blocking pool.
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_code: String,
    dimension: usize,
}

impl FastEmbedder {
    /// Load the model named in `config`, downloading it on first use.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, model_code, dimension) = resolve_model(&config.model)?;

        let mut options = InitOptions::new(model);
        if let Some(cache_dir) = &config.cache_dir {
            options = options.with_cache_dir(cache_dir.clone());
        }

        tracing::info!("Loading embedding model {model_code} ({dimension} dimensions)");
        let embedding = TextEmbedding::try_new(options).map_err(|e| {
            EngramError::ProviderUnavailable(format!("Failed to load embedding model: {e}"))
        })?;

        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
            model_code,
            dimension,
        })
    }

    /// Identifier of the loaded model
    pub fn model_code(&self) -> &str {
        &self.model_code
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| {
                EngramError::ProviderUnavailable("Embedding model lock poisoned".to_string())
            })?;
            model
                .embed(vec![text], None)
                .map_err(|e| EngramError::ProviderUnavailable(format!("Embedding failed: {e}")))
        })
        .await
        .map_err(|e| EngramError::ProviderUnavailable(format!("Embedding task failed: {e}")))??;

        embeddings.into_iter().next().ok_or_else(|| {
            EngramError::ProviderUnavailable("No embedding returned".to_string())
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Find a supported model by identifier.
///
/// Matches fastembed's model code exactly (case-insensitive) or by the name
/// after the organisation prefix, so `sentence-transformers/all-mpnet-base-v2`
/// resolves to `Xenova/all-mpnet-base-v2`.
fn resolve_model(identifier: &str) -> Result<(FastEmbedModel, String, usize)> {
    let wanted = identifier.trim().to_ascii_lowercase();
    let wanted_name = model_name(&wanted);
    let supported = TextEmbedding::list_supported_models();

    let info = supported
        .iter()
        .find(|info| info.model_code.to_ascii_lowercase() == wanted)
        .or_else(|| {
            supported
                .iter()
                .find(|info| model_name(&info.model_code.to_ascii_lowercase()) == wanted_name)
        })
        .ok_or_else(|| {
            EngramError::InvalidConfiguration(format!("Unsupported embedding model: {identifier}"))
        })?;

    Ok((info.model.clone(), info.model_code.clone(), info.dim))
}

fn model_name(code: &str) -> &str {
    code.rsplit('/').next().unwrap_or(code)
}

/// Cosine similarity in `[-1, 1]`; zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
