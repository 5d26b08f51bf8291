//! Extract, chunk, embed, index, register.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::IngestError;
use crate::models::{DEFAULT_MAX_UPLOAD_BYTES, DocumentMetadata, IngestResponse};
use crate::services::{DocumentExtractor, Embedder, SessionStore, TextChunker, VectorIndex};
use crate::utils::file::{calculate_checksum, stage_document};

/// Uploaded bytes; staged to disk before extraction.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    pub content: Vec<u8>,
    pub filename: Option<String>,
}

impl DocumentSource {
    pub fn upload(content: impl Into<Vec<u8>>, filename: Option<&str>) -> Self {
        Self {
            content: content.into(),
            filename: filename.map(str::to_string),
        }
    }
}

/// Builds one session per document.
///
/// Nothing is registered until every step has succeeded. A caller that
/// abandons `ingest` midway (for example a dropped connection) gets no
/// guarantee either way: the blocking extraction keeps running, and if the
/// future is polled to completion elsewhere the session may still appear.
pub struct IngestPipeline {
    extractor: Arc<dyn DocumentExtractor>,
    chunker: TextChunker,
    embedder: Embedder,
    store: Arc<SessionStore>,
    staging_dir: PathBuf,
    max_upload_bytes: u64,
}

impl IngestPipeline {
    pub fn new(
        extractor: Arc<dyn DocumentExtractor>,
        chunker: TextChunker,
        embedder: Embedder,
        store: Arc<SessionStore>,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            extractor,
            chunker,
            embedder,
            store,
            staging_dir,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: u64) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    #[cfg(test)]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub async fn ingest(&self, source: DocumentSource) -> Result<IngestResponse, IngestError> {
        let start = Instant::now();

        let size = source.content.len() as u64;
        if size > self.max_upload_bytes {
            return Err(IngestError::TooLarge {
                size,
                max: self.max_upload_bytes,
            });
        }

        let extractor = Arc::clone(&self.extractor);
        let staging_dir = self.staging_dir.clone();
        let (text, mut metadata) = tokio::task::spawn_blocking(move || {
            prepare(extractor.as_ref(), &staging_dir, source)
        })
        .await
        .map_err(|e| IngestError::Task(e.to_string()))??;
        metadata.text_chars = text.chars().count();

        let chunks = self.chunker.chunk(&text);
        if chunks.is_empty() {
            debug!(document = metadata.display_name(), "no text after chunking");
            return Err(IngestError::EmptyDocument);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;
        let index = VectorIndex::build(&embeddings)?;

        let num_chunks = chunks.len();
        let document = metadata.display_name().to_string();
        let session_id = self.store.create(chunks, index, metadata).await?;

        info!(
            session_id = %session_id,
            document = %document,
            num_chunks,
            latency_ms = start.elapsed().as_millis() as u64,
            "document ingested"
        );

        Ok(IngestResponse {
            session_id,
            num_chunks,
        })
    }
}

/// Stage and extract. Runs on the blocking pool.
fn prepare(
    extractor: &dyn DocumentExtractor,
    staging_dir: &Path,
    source: DocumentSource,
) -> Result<(String, DocumentMetadata), IngestError> {
    let DocumentSource { content, filename } = source;

    let prefix = Uuid::new_v4().to_string();
    let path = stage_document(staging_dir, &prefix, filename.as_deref(), &content)
        .map_err(IngestError::Staging)?;
    let metadata = DocumentMetadata {
        filename,
        staged_path: Some(path.clone()),
        checksum: Some(calculate_checksum(&content)),
        size_bytes: content.len() as u64,
        text_chars: 0,
    };

    let text = extractor.extract(&path)?;
    Ok((text, metadata))
}
