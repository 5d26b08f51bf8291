//! Question answering context: top chunks of one session.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::error::QueryError;
use crate::models::{DEFAULT_TOP_K, QueryRequest, QueryResponse};
use crate::services::{Embedder, SessionStore};

pub struct QueryService {
    store: Arc<SessionStore>,
    embedder: Embedder,
    default_top_k: u32,
}

impl QueryService {
    pub fn new(store: Arc<SessionStore>, embedder: Embedder) -> Self {
        Self {
            store,
            embedder,
            default_top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_default_top_k(mut self, top_k: u32) -> Self {
        self.default_top_k = top_k;
        self
    }

    #[cfg(test)]
    pub fn default_top_k(&self) -> u32 {
        self.default_top_k
    }

    /// Rank the session's chunks against `request.question`.
    ///
    /// Checks run in order: unknown session, blank question, zero `top_k`.
    /// At most `min(top_k, chunk count)` results are returned, best first,
    /// with `similarities[i]` belonging to `top_chunks[i]`.
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        let start = Instant::now();

        let session = self
            .store
            .get(&request.session_id)
            .await
            .ok_or_else(|| QueryError::SessionNotFound(request.session_id.clone()))?;

        let question = request.question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let top_k = request.top_k.unwrap_or(self.default_top_k);
        if top_k == 0 {
            return Err(QueryError::InvalidTopK);
        }
        let k = (top_k as usize).min(session.len());

        let query_vector = self.embedder.embed_query(question).await?;
        let hits = session.index().search(&query_vector, k)?;

        let mut response = QueryResponse::default();
        for hit in hits {
            match session.chunk(hit.position) {
                Some(chunk) => response.push(chunk.content.clone(), hit.score),
                None => warn!(
                    session_id = %request.session_id,
                    position = hit.position,
                    "search hit outside chunk list, skipped"
                ),
            }
        }

        info!(
            session_id = %request.session_id,
            top_k = k,
            results = response.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "query served"
        );

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::services::embedding::testing::TableEmbedder;
    use crate::services::ingest::tests::pipeline_with;
    use crate::services::{DocumentSource, EmbeddingProvider, HashingEmbedder};

    const ANIMALS: &str = "Cats are mammals. Dogs are mammals too.";

    async fn ingest_with(
        provider: Arc<dyn EmbeddingProvider>,
        text: &str,
        size: usize,
        overlap: usize,
    ) -> (QueryService, String, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, store) = pipeline_with(dir.path(), Arc::clone(&provider), size, overlap);
        let response = pipeline
            .ingest(DocumentSource::upload(text, Some("doc.txt")))
            .await
            .unwrap();
        let service = QueryService::new(store, Embedder::new(provider));
        (service, response.session_id, dir)
    }

    #[tokio::test]
    async fn test_cats_question_ranks_cats_chunk_first() {
        let (service, session_id, _dir) =
            ingest_with(Arc::new(HashingEmbedder::new(384)), ANIMALS, 20, 5).await;

        let response = service
            .query(&QueryRequest::new(&session_id, "Tell me about cats").with_top_k(2))
            .await
            .unwrap();

        assert_eq!(response.len(), 2);
        assert!(response.top_chunks[0].contains("Cats are mammals"));
        assert!(response.similarities[0] >= response.similarities[1]);
        assert!(response.similarities[0] > 0.0);
    }

    #[tokio::test]
    async fn test_basis_vectors_score_exactly() {
        let provider = Arc::new(TableEmbedder {
            table: vec![
                ("aaaa".to_string(), vec![1.0, 0.0, 0.0]),
                ("bbbb".to_string(), vec![0.0, 1.0, 0.0]),
                ("cccc".to_string(), vec![0.0, 0.0, 1.0]),
                ("which one".to_string(), vec![0.0, 5.0, 0.0]),
            ],
            fallback: vec![1.0, 1.0, 1.0],
        });
        let (service, session_id, _dir) = ingest_with(provider, "aaaabbbbcccc", 4, 0).await;

        let response = service
            .query(&QueryRequest::new(&session_id, "which one"))
            .await
            .unwrap();

        assert_eq!(response.top_chunks, vec!["bbbb", "aaaa", "cccc"]);
        assert!((response.similarities[0] - 1.0).abs() < 1e-6);
        assert!(response.similarities[1].abs() < 1e-6);
        assert!(response.similarities[2].abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_top_k_is_clamped_to_chunk_count() {
        let (service, session_id, _dir) =
            ingest_with(Arc::new(HashingEmbedder::new(384)), ANIMALS, 20, 5).await;

        let response = service
            .query(&QueryRequest::new(&session_id, "mammals").with_top_k(50))
            .await
            .unwrap();

        assert_eq!(response.len(), 3);
        assert_eq!(response.top_chunks.len(), response.similarities.len());
        for pair in response.similarities.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        for score in &response.similarities {
            assert!((-1.0 - 1e-5..=1.0 + 1e-5).contains(score));
        }
    }

    #[tokio::test]
    async fn test_default_top_k_applies() {
        let text = "one two three four five six seven eight nine ten";
        let (service, session_id, _dir) =
            ingest_with(Arc::new(HashingEmbedder::new(128)), text, 8, 0).await;
        assert_eq!(service.default_top_k(), 4);

        let response = service
            .query(&QueryRequest::new(&session_id, "seven"))
            .await
            .unwrap();
        assert_eq!(response.len(), 4);

        let service = service.with_default_top_k(2);
        let response = service
            .query(&QueryRequest::new(&session_id, "seven"))
            .await
            .unwrap();
        assert_eq!(response.len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_query_is_identical() {
        let (service, session_id, _dir) =
            ingest_with(Arc::new(HashingEmbedder::new(384)), ANIMALS, 20, 5).await;
        let request = QueryRequest::new(&session_id, "Are dogs mammals?");

        let first = service.query(&request).await.unwrap();
        let second = service.query(&request).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(384));
        let (pipeline, store) = pipeline_with(dir.path(), Arc::clone(&provider), 800, 200);

        let cats = pipeline
            .ingest(DocumentSource::upload("Cats purr and sleep.", None))
            .await
            .unwrap();
        let ships = pipeline
            .ingest(DocumentSource::upload("Ships sail across oceans.", None))
            .await
            .unwrap();
        assert_ne!(cats.session_id, ships.session_id);

        let service = QueryService::new(store, Embedder::new(provider));
        let response = service
            .query(&QueryRequest::new(&ships.session_id, "cats"))
            .await
            .unwrap();

        assert_eq!(response.top_chunks, vec!["Ships sail across oceans."]);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (service, _, _dir) =
            ingest_with(Arc::new(HashingEmbedder::new(64)), ANIMALS, 20, 5).await;

        let err = service
            .query(&QueryRequest::new("nonexistent-id", "anything"))
            .await
            .unwrap_err();

        assert!(matches!(&err, QueryError::SessionNotFound(id) if id == "nonexistent-id"));
        assert_eq!(err.kind(), ErrorKind::SessionNotFound);
    }

    #[tokio::test]
    async fn test_blank_question_is_rejected() {
        let (service, session_id, _dir) =
            ingest_with(Arc::new(HashingEmbedder::new(64)), ANIMALS, 20, 5).await;

        for question in ["", "   \n\t"] {
            let err = service
                .query(&QueryRequest::new(&session_id, question))
                .await
                .unwrap_err();
            assert!(matches!(err, QueryError::EmptyQuery));
            assert_eq!(err.kind(), ErrorKind::EmptyQuery);
        }
    }

    #[tokio::test]
    async fn test_zero_top_k_is_rejected() {
        let (service, session_id, _dir) =
            ingest_with(Arc::new(HashingEmbedder::new(64)), ANIMALS, 20, 5).await;

        let err = service
            .query(&QueryRequest::new(&session_id, "cats").with_top_k(0))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidTopK));
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_session_check_precedes_question_check() {
        let (service, _, _dir) =
            ingest_with(Arc::new(HashingEmbedder::new(64)), ANIMALS, 20, 5).await;

        let err = service
            .query(&QueryRequest::new("missing", "").with_top_k(0))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, store) =
            pipeline_with(dir.path(), Arc::new(HashingEmbedder::new(8)), 800, 200);
        let response = pipeline
            .ingest(DocumentSource::upload(ANIMALS, None))
            .await
            .unwrap();

        let service = QueryService::new(store, Embedder::new(Arc::new(HashingEmbedder::new(16))));
        let err = service
            .query(&QueryRequest::new(&response.session_id, "cats"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    }
}
