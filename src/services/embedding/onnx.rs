use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};
use tracing::info;

use super::{EmbeddingProvider, InstructionType};
use crate::error::{EmbeddingError, ModelError};
use crate::models::EmbeddingConfig;

/// Sentence-transformer exported to ONNX, run in-process.
///
/// Cloning is cheap; clones share one runtime session.
#[derive(Clone)]
pub struct OnnxEmbeddingModel {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    model_id: String,
    query_instruction: Option<String>,
    /// BERT-style graphs declare a third input.
    uses_token_type_ids: bool,
}

impl std::fmt::Debug for OnnxEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingModel")
            .field("model_id", &self.model_id)
            .field("uses_token_type_ids", &self.uses_token_type_ids)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingModel {
    pub fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, ModelError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let max_tokens = config.max_tokens as usize;

        if !model_path.exists() {
            return Err(ModelError::NotFound(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| ModelError::LoadError(e.to_string()))?;

        let uses_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        // Configure truncation to prevent OOM with long texts
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        info!(
            model = %config.model_id,
            path = %model_path.display(),
            uses_token_type_ids,
            "onnx embedding model loaded"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            model_id: config.model_id.clone(),
            query_instruction: config.query_instruction.clone(),
            uses_token_type_ids,
        })
    }

    /// Run inference on the calling thread.
    pub fn embed_blocking(
        &self,
        texts: &[String],
        kind: InstructionType,
    ) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let processed: Vec<String> = match (kind, &self.query_instruction) {
            (InstructionType::Query, Some(instruction)) => texts
                .iter()
                .map(|t| format!("{}{}", instruction, t))
                .collect(),
            _ => texts.to_vec(),
        };

        let encodings = self
            .tokenizer
            .encode_batch(processed, true)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch_size = encodings.len();

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for (j, (&id, &m)) in ids.iter().zip(mask.iter()).enumerate() {
                input_ids[i * max_len + j] = id as i64;
                attention_mask[i * max_len + j] = m as i64;
            }
        }

        let shape = [batch_size, max_len];
        let input_ids_tensor = Tensor::from_array((shape, input_ids))
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array((shape, attention_mask.clone()))
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceError("session lock poisoned".to_string()))?;

        let outputs = if self.uses_token_type_ids {
            let token_type_ids_tensor =
                Tensor::from_array((shape, vec![0i64; batch_size * max_len]))
                    .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;
            session.run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])
        }
        .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let output_array = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e: ort::Error| ModelError::InferenceError(e.to_string()))?;

        let output_shape = output_array.shape().to_vec();

        match output_shape.as_slice() {
            // Token embeddings [batch, seq, hidden]: mean over unmasked tokens.
            &[_, seq_len, hidden] => Ok((0..batch_size)
                .map(|i| {
                    let mut pooled = vec![0.0f32; hidden];
                    let mut count = 0.0f32;
                    for t in 0..seq_len.min(max_len) {
                        if attention_mask[i * max_len + t] == 0 {
                            continue;
                        }
                        count += 1.0;
                        for (d, value) in pooled.iter_mut().enumerate() {
                            *value += output_array[[i, t, d]];
                        }
                    }
                    for value in &mut pooled {
                        *value /= count.max(1e-9);
                    }
                    pooled
                })
                .collect()),
            // Sentence embeddings [batch, hidden].
            &[_, hidden] => Ok((0..batch_size)
                .map(|i| (0..hidden).map(|d| output_array[[i, d]]).collect())
                .collect()),
            other => Err(ModelError::InferenceError(format!(
                "unexpected output shape: {:?}",
                other
            ))),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbeddingModel {
    async fn embed(
        &self,
        texts: &[String],
        kind: InstructionType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = self.clone();
        let texts = texts.to_vec();
        let embeddings = tokio::task::spawn_blocking(move || model.embed_blocking(&texts, kind))
            .await
            .map_err(|e| ModelError::InferenceError(format!("inference task failed: {e}")))??;
        Ok(embeddings)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_model_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = OnnxEmbeddingModel::load(&EmbeddingConfig::default(), dir.path());
        assert!(matches!(result, Err(ModelError::NotFound(_))));
    }
}
