//! Embedding adapter and the providers behind it.
//!
//! Providers only have to return one vector per input. The [`Embedder`]
//! adapter enforces that contract and L2-normalizes every vector, so the
//! rest of the crate can treat inner product as cosine similarity.

mod hashing;
mod http;
mod onnx;

pub use hashing::HashingEmbedder;
pub use http::{HealthResponse, HttpEmbeddingClient};
pub use onnx::OnnxEmbeddingModel;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, EmbeddingDriver};

/// Instruction type for embedding generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionType {
    /// For indexing document chunks
    Document,
    /// For questions
    Query,
}

/// A model that maps strings to dense vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch, one vector per input in input order.
    async fn embed(
        &self,
        texts: &[String],
        kind: InstructionType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn model_id(&self) -> &str;
}

/// Normalizing wrapper around an [`EmbeddingProvider`].
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("model_id", &self.provider.model_id())
            .finish()
    }
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Embed document chunks in a single batch call.
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.embed(texts, InstructionType::Document).await
    }

    /// Embed one question.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(&[text.to_string()], InstructionType::Query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    async fn embed(
        &self,
        texts: &[String],
        kind: InstructionType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = self.provider.embed(texts, kind).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        for vector in &mut vectors {
            normalize(vector);
        }

        debug!(count = vectors.len(), ?kind, "embedded batch");
        Ok(vectors)
    }
}

/// Scale `v` to unit Euclidean norm. Zero vectors are left unchanged.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Create the provider selected by configuration.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    info!(driver = %config.driver, model = %config.model_id, "loading embedding provider");
    match config.driver {
        EmbeddingDriver::Onnx => {
            let model_dir = config.model_dir().ok_or_else(|| {
                EmbeddingError::Model(crate::error::ModelError::NotFound(
                    "could not determine models directory".to_string(),
                ))
            })?;
            Ok(Arc::new(OnnxEmbeddingModel::load(config, &model_dir)?))
        }
        EmbeddingDriver::Http => Ok(Arc::new(HttpEmbeddingClient::new(config)?)),
        EmbeddingDriver::Hashing => Ok(Arc::new(HashingEmbedder::new(
            config.dimension as usize,
        ))),
    }
}
