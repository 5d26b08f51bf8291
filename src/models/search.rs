//! Request and response records for the ingest and query operations.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
    /// Documentation-friendly Markdown format
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// Successful ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub session_id: String,
    pub num_chunks: usize,
}

/// A question against one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub session_id: String,
    pub question: String,
    /// Falls back to the configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl QueryRequest {
    pub fn new(session_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            question: question.into(),
            top_k: None,
        }
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// Ranked passages, index-aligned with their similarities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub top_chunks: Vec<String>,
    pub similarities: Vec<f32>,
}

impl QueryResponse {
    pub fn push(&mut self, text: String, score: f32) {
        self.top_chunks.push(text);
        self.similarities.push(score);
    }

    pub fn is_empty(&self) -> bool {
        self.top_chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.top_chunks.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.top_chunks
            .iter()
            .map(String::as_str)
            .zip(self.similarities.iter().copied())
    }
}

/// A generated answer with the passages it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub top_chunks: Vec<String>,
}

/// Failure descriptor returned in place of a success payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&crate::error::IngestError> for ErrorResponse {
    fn from(error: &crate::error::IngestError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

impl From<&crate::error::QueryError> for ErrorResponse {
    fn from(error: &crate::error::QueryError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

impl From<&crate::error::AnswerError> for ErrorResponse {
    fn from(error: &crate::error::AnswerError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}
