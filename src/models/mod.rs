mod config;
mod document;
mod search;

pub use config::{
    APP_NAME, AnswerConfig, ChunkingConfig, Config, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
    DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_TOP_K,
    EmbeddingConfig, EmbeddingDriver, MetricsConfig, QueryConfig, ServerConfig, SessionConfig,
};
pub use document::{Chunk, DocumentMetadata};
pub use search::{ChatResponse, ErrorResponse, IngestResponse, OutputFormat, QueryRequest, QueryResponse};
