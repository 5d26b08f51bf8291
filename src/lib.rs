pub mod cli;
pub mod client;
pub mod error;
pub mod models;
pub mod server;
pub mod services;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::{AppError, ErrorKind};
pub use models::{ChatResponse, Config, IngestResponse, OutputFormat, QueryRequest, QueryResponse};
pub use services::{
    AnswerService, DocumentExtractor, DocumentSource, Embedder, EmbeddingProvider, IngestPipeline,
    QueryService, Session, SessionStore, TextChunker, VectorIndex,
};
