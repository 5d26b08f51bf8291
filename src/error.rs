//! Error types for document ingestion and querying.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure kinds reported to clients at the operation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ExtractionError,
    EmptyDocument,
    DimensionMismatch,
    SessionNotFound,
    EmptyQuery,
    ConfigurationError,
    InvalidRequest,
    EmbeddingError,
    GenerationError,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ExtractionError => "extraction_error",
            ErrorKind::EmptyDocument => "empty_document",
            ErrorKind::DimensionMismatch => "dimension_mismatch",
            ErrorKind::SessionNotFound => "session_not_found",
            ErrorKind::EmptyQuery => "empty_query",
            ErrorKind::ConfigurationError => "configuration_error",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::EmbeddingError => "embedding_error",
            ErrorKind::GenerationError => "generation_error",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("invalid chunking: overlap ({overlap}) must be smaller than size ({size})")]
    InvalidChunking { size: usize, overlap: usize },

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors raised while turning a document into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf extract failed: {0}")]
    Pdf(String),

    #[error("document is not valid UTF-8 text")]
    InvalidUtf8,

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
}

/// Errors related to the ONNX embedding model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("failed to load model: {0}")]
    LoadError(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("inference error: {0}")]
    InferenceError(String),
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,

    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

/// Errors related to building or searching a vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("dimension mismatch at position {position}: expected {expected}, got {actual}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        actual: usize,
    },

    #[error("query dimension mismatch: index has {expected}, query has {actual}")]
    QueryDimensionMismatch { expected: usize, actual: usize },

    #[error("vector at position {0} contains NaN or infinite values")]
    NonFinite(usize),

    #[error("{chunks} chunks but {vectors} indexed vectors")]
    CountMismatch { chunks: usize, vectors: usize },

    #[error("invalid index shape: {0}")]
    Shape(String),
}

/// Errors surfaced by the ingest operation.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("no text found in document")]
    EmptyDocument,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("upload too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("staging failed: {0}")]
    Staging(std::io::Error),

    #[error("ingest task failed: {0}")]
    Task(String),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Extraction(_) => ErrorKind::ExtractionError,
            IngestError::EmptyDocument => ErrorKind::EmptyDocument,
            IngestError::Config(_) => ErrorKind::ConfigurationError,
            IngestError::Embedding(_) => ErrorKind::EmbeddingError,
            IngestError::Index(e) => index_kind(e),
            IngestError::TooLarge { .. } | IngestError::InvalidUpload(_) => {
                ErrorKind::InvalidRequest
            }
            IngestError::Staging(_) | IngestError::Task(_) => ErrorKind::Internal,
        }
    }
}

/// Errors surfaced by the query operation.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid session_id: {0}")]
    SessionNotFound(String),

    #[error("empty question")]
    EmptyQuery,

    #[error("top_k must be a positive integer")]
    InvalidTopK,

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::SessionNotFound(_) => ErrorKind::SessionNotFound,
            QueryError::EmptyQuery => ErrorKind::EmptyQuery,
            QueryError::InvalidTopK => ErrorKind::InvalidRequest,
            QueryError::Embedding(_) => ErrorKind::EmbeddingError,
            QueryError::Index(e) => index_kind(e),
        }
    }
}

/// Errors surfaced by the chat operation.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("failed to connect to completion endpoint: {0}")]
    ConnectionError(String),

    #[error("completion endpoint error: {0}")]
    ServerError(String),

    #[error("completion request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("completion timeout")]
    Timeout,
}

impl AnswerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnswerError::Query(e) => e.kind(),
            _ => ErrorKind::GenerationError,
        }
    }
}

fn index_kind(error: &IndexError) -> ErrorKind {
    match error {
        IndexError::DimensionMismatch { .. } | IndexError::QueryDimensionMismatch { .. } => {
            ErrorKind::DimensionMismatch
        }
        IndexError::NonFinite(_) => ErrorKind::EmbeddingError,
        IndexError::CountMismatch { .. } | IndexError::Shape(_) => ErrorKind::Internal,
    }
}

/// Errors related to the daemon process and its socket.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon is not running")]
    NotRunning,

    #[error("failed to spawn daemon: {0}")]
    SpawnError(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("socket error: {0}")]
    SocketError(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("{kind}: {message}")]
    Remote { kind: ErrorKind, message: String },

    #[error("timed out waiting for daemon")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("chat error: {0}")]
    Answer(#[from] AnswerError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("daemon error: {0}")]
    Daemon(#[from] DaemonError),

    #[error("{0}")]
    Other(String),
}
