mod answer;
mod chunker;
pub mod embedding;
mod extract;
mod ingest;
mod metrics;
mod query;
mod session_store;
mod vector_index;

pub use answer::AnswerService;
pub use chunker::TextChunker;
pub use embedding::{
    Embedder, EmbeddingProvider, HashingEmbedder, HttpEmbeddingClient, InstructionType,
    OnnxEmbeddingModel, create_provider, normalize,
};
pub use extract::{DocumentExtractor, FileExtractor};
pub use ingest::{DocumentSource, IngestPipeline};
pub use metrics::{MetricsStore, MetricsSummary, Operation};
pub use query::QueryService;
pub use session_store::{Session, SessionStore, StoreStats};
pub use vector_index::{SearchHit, VectorIndex};
