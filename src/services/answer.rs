//! Grounded answers: retrieve a session's top chunks, then ask an
//! OpenAI-compatible chat completions endpoint to answer from them alone.

use std::fmt::Write as FmtWrite;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AnswerError;
use crate::models::{AnswerConfig, ChatResponse, QueryRequest};
use crate::services::QueryService;

const DEFAULT_NOT_FOUND_REPLY: &str =
    "Sorry, I could not find enough information in the document.";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [Message; 2],
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct AnswerService {
    query: Arc<QueryService>,
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    reply_language: Option<String>,
    not_found_reply: String,
}

impl AnswerService {
    pub fn new(query: Arc<QueryService>, config: &AnswerConfig) -> Result<Self, AnswerError> {
        Self::with_client(query, config, Client::builder())
    }

    fn with_client(
        query: Arc<QueryService>,
        config: &AnswerConfig,
        builder: ClientBuilder,
    ) -> Result<Self, AnswerError> {
        let client = builder
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnswerError::ConnectionError(e.to_string()))?;

        Ok(Self {
            query,
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key(),
            reply_language: config.reply_language.clone(),
            not_found_reply: config
                .not_found_reply
                .clone()
                .unwrap_or_else(|| DEFAULT_NOT_FOUND_REPLY.to_string()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Retrieve context for `request` and generate an answer from it.
    ///
    /// Retrieval errors keep their query kinds; the completion call is only
    /// made once retrieval succeeded.
    pub async fn chat(&self, request: &QueryRequest) -> Result<ChatResponse, AnswerError> {
        let retrieved = self.query.query(request).await?;

        let start = Instant::now();
        let answer = self
            .complete(request.question.trim(), &retrieved.top_chunks)
            .await?;

        info!(
            session_id = %request.session_id,
            context_chunks = retrieved.len(),
            model = %self.model,
            latency_ms = start.elapsed().as_millis() as u64,
            "answer generated"
        );

        Ok(ChatResponse {
            answer,
            top_chunks: retrieved.top_chunks,
        })
    }

    async fn complete(&self, question: &str, chunks: &[String]) -> Result<String, AnswerError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: self.system_message(),
                },
                Message {
                    role: "user",
                    content: self.build_prompt(question, chunks),
                },
            ],
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AnswerError::Timeout
            } else if e.is_connect() {
                AnswerError::ConnectionError(e.to_string())
            } else {
                AnswerError::RequestError(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnswerError::ServerError(format!("status {}: {}", status, body)));
        }

        let text = response.text().await?;
        let content = serde_json::from_str::<CompletionResponse>(&text)
            .ok()
            .and_then(|r| r.choices.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content);

        match content {
            Some(answer) => Ok(answer),
            None => {
                warn!("completion response has no message content, returning raw body");
                Ok(text)
            }
        }
    }

    fn system_message(&self) -> String {
        match self.reply_language {
            Some(ref language) => format!(
                "You are a helpful assistant that answers in {language} using only the provided context."
            ),
            None => "You are a helpful assistant that answers using only the provided context."
                .to_string(),
        }
    }

    fn build_prompt(&self, question: &str, chunks: &[String]) -> String {
        let mut prompt = String::from(
            "You are a helpful assistant. Answer the user's question ONLY using the provided CONTEXT.\n",
        );
        if let Some(ref language) = self.reply_language {
            writeln!(prompt, "Reply in {language}.").unwrap();
        }
        write!(
            prompt,
            "If the answer cannot be found in the context, say:\n\"{}\"",
            self.not_found_reply
        )
        .unwrap();

        prompt.push_str("\n\nCONTEXT:\n");
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                prompt.push_str("\n\n");
            }
            write!(prompt, "[CONTEXT {}]\n{}", i + 1, chunk).unwrap();
        }

        write!(
            prompt,
            "\n\nUSER QUESTION:\n{question}\n\nAnswer only from the context above."
        )
        .unwrap();
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::services::ingest::tests::pipeline_with;
    use crate::services::{DocumentSource, Embedder, HashingEmbedder};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const ANIMALS: &str = "Cats are mammals. Dogs are mammals too.";

    /// Captured request: lowercased head and raw body.
    struct Captured {
        head: String,
        body: String,
    }

    /// Accept one HTTP request on a local port and answer it with `reply`.
    async fn completion_stub(
        status: &'static str,
        reply: &'static str,
    ) -> (String, JoinHandle<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];

            let body_start = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let head = String::from_utf8_lossy(&buf[..body_start]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().unwrap())
                .unwrap_or(0);

            while buf.len() < body_start + length {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before body");
                buf.extend_from_slice(&chunk[..n]);
            }
            let body = String::from_utf8(buf[body_start..body_start + length].to_vec()).unwrap();

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{reply}",
                reply.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;

            Captured { head, body }
        });

        (format!("http://{addr}/v1/chat/completions"), handle)
    }

    async fn answer_service(
        endpoint: String,
        dir: &std::path::Path,
        tweak: impl FnOnce(&mut AnswerConfig),
    ) -> (AnswerService, String) {
        let provider: Arc<dyn crate::services::EmbeddingProvider> =
            Arc::new(HashingEmbedder::new(384));
        let (pipeline, store) = pipeline_with(dir, Arc::clone(&provider), 20, 5);
        let session_id = pipeline
            .ingest(DocumentSource::upload(ANIMALS, Some("animals.txt")))
            .await
            .unwrap()
            .session_id;

        let query = Arc::new(QueryService::new(store, Embedder::new(provider)));
        let mut config = AnswerConfig {
            endpoint,
            model: "test-model".to_string(),
            api_key_env: "DOCRAG_TEST_UNSET_ANSWER_KEY".to_string(),
            ..Default::default()
        };
        tweak(&mut config);

        let service =
            AnswerService::with_client(query, &config, Client::builder().no_proxy()).unwrap();
        (service, session_id)
    }

    #[tokio::test]
    async fn test_prompt_carries_retrieved_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let (endpoint, stub) = completion_stub(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"Cats are mammals."}}]}"#,
        )
        .await;
        let (service, session_id) = answer_service(endpoint, dir.path(), |c| {
            c.reply_language = Some("Arabic".to_string());
        })
        .await;

        let response = service
            .chat(&QueryRequest::new(&session_id, "  Tell me about cats ").with_top_k(2))
            .await
            .unwrap();

        assert_eq!(response.answer, "Cats are mammals.");
        assert_eq!(response.top_chunks.len(), 2);

        let captured = stub.await.unwrap();
        assert!(captured.head.starts_with("post /v1/chat/completions"));
        assert!(!captured.head.contains("authorization:"));

        let body: serde_json::Value = serde_json::from_str(&captured.body).unwrap();
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][0]["content"].as_str().unwrap().contains("Arabic"));

        let prompt = body["messages"][1]["content"].as_str().unwrap();
        assert!(prompt.contains("Reply in Arabic."));
        assert!(prompt.contains(&format!("[CONTEXT 1]\n{}", response.top_chunks[0])));
        assert!(prompt.contains(&format!("[CONTEXT 2]\n{}", response.top_chunks[1])));
        assert!(prompt.contains("USER QUESTION:\nTell me about cats\n"));
        assert!(prompt.ends_with("Answer only from the context above."));
    }

    #[tokio::test]
    async fn test_missing_content_returns_raw_body() {
        let dir = tempfile::tempdir().unwrap();
        let (endpoint, stub) = completion_stub("200 OK", r#"{"choices":[]}"#).await;
        let (service, session_id) = answer_service(endpoint, dir.path(), |_| {}).await;

        let response = service
            .chat(&QueryRequest::new(&session_id, "cats"))
            .await
            .unwrap();
        assert_eq!(response.answer, r#"{"choices":[]}"#);
        stub.await.unwrap();
    }

    #[tokio::test]
    async fn test_endpoint_failure_is_generation_error() {
        let dir = tempfile::tempdir().unwrap();
        let (endpoint, stub) =
            completion_stub("500 Internal Server Error", r#"{"error":"overloaded"}"#).await;
        let (service, session_id) = answer_service(endpoint, dir.path(), |_| {}).await;

        let err = service
            .chat(&QueryRequest::new(&session_id, "cats"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnswerError::ServerError(ref m) if m.contains("overloaded")));
        assert_eq!(err.kind(), ErrorKind::GenerationError);
        stub.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_session_skips_completion() {
        let dir = tempfile::tempdir().unwrap();
        // Nothing listens here; retrieval must fail before any request is made.
        let (service, _) =
            answer_service("http://127.0.0.1:9/unused".to_string(), dir.path(), |_| {}).await;

        let err = service
            .chat(&QueryRequest::new("nonexistent-id", "cats"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionNotFound);
    }

    #[test]
    fn test_prompt_without_language() {
        let config = AnswerConfig {
            not_found_reply: Some("Not in the file.".to_string()),
            ..Default::default()
        };
        let store = Arc::new(crate::services::SessionStore::unbounded());
        let query = Arc::new(QueryService::new(
            store,
            Embedder::new(Arc::new(HashingEmbedder::new(8))),
        ));
        let service = AnswerService::new(query, &config).unwrap();

        let prompt = service.build_prompt("why?", &["only chunk".to_string()]);
        assert!(!prompt.contains("Reply in"));
        assert!(prompt.contains("say:\n\"Not in the file.\""));
        assert!(prompt.contains("CONTEXT:\n[CONTEXT 1]\nonly chunk\n\nUSER QUESTION:\nwhy?"));
    }
}
