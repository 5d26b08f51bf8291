use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const APP_NAME: &str = "docrag";
pub const DEFAULT_CHUNK_SIZE: usize = 800;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_TOP_K: u32 = 4;
pub const DEFAULT_EMBEDDING_MODEL: &str =
    "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";
pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11411";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 32 * 1024 * 1024;
pub const DEFAULT_METRICS_RETENTION_DAYS: u32 = 7;
pub const DEFAULT_ANSWER_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_ANSWER_MODEL: &str = "google/gemini-2.0-flash-exp";
pub const DEFAULT_ANSWER_API_KEY_ENV: &str = "DOCRAG_ANSWER_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub answer: AnswerConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_NAME).join("config.toml"))
    }

    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|p| p.join(APP_NAME))
    }

    pub fn models_dir() -> Option<PathBuf> {
        Self::data_dir().map(|p| p.join("models"))
    }

    pub fn metrics_db_path() -> Option<PathBuf> {
        Self::data_dir().map(|p| p.join("metrics.db"))
    }

    /// Load from the default location, falling back to defaults when absent.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;
        if self.query.default_top_k == 0 {
            return Err(ConfigError::ValidationError(
                "query.default_top_k must be at least 1".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }
        if self.answer.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "answer.endpoint cannot be empty".to_string(),
            ));
        }
        if self.sessions.max_sessions == Some(0) {
            return Err(ConfigError::ValidationError(
                "sessions.max_sessions must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn socket_path(&self) -> PathBuf {
        self.server.socket_path.clone().unwrap_or_else(|| {
            runtime_dir().join(format!("{APP_NAME}.sock"))
        })
    }

    pub fn pid_path(&self) -> PathBuf {
        self.socket_path().with_extension("pid")
    }

    /// Where an auto-started daemon writes its log output.
    pub fn log_path(&self) -> PathBuf {
        self.server.log_file.clone().unwrap_or_else(|| {
            Self::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("daemon.log")
        })
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.server.staging_dir.clone().unwrap_or_else(|| {
            Self::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("uploads")
        })
    }
}

fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(Config::data_dir)
        .unwrap_or_else(std::env::temp_dir)
}

/// Window sizes are measured in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn new(size: usize, overlap: usize) -> Self {
        Self { size, overlap }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size == 0 || self.overlap >= self.size {
            return Err(ConfigError::InvalidChunking {
                size: self.size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingDriver {
    #[default]
    Onnx,
    Http,
    Hashing,
}

impl FromStr for EmbeddingDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "onnx" => Ok(EmbeddingDriver::Onnx),
            "http" | "tei" => Ok(EmbeddingDriver::Http),
            "hashing" | "hash" => Ok(EmbeddingDriver::Hashing),
            _ => Err(format!("unknown embedding driver: {}", s)),
        }
    }
}

impl fmt::Display for EmbeddingDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingDriver::Onnx => write!(f, "onnx"),
            EmbeddingDriver::Http => write!(f, "http"),
            EmbeddingDriver::Hashing => write!(f, "hashing"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub driver: EmbeddingDriver,

    #[serde(default = "default_model_id")]
    pub model_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Output size of the hashing driver; model drivers report their own.
    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_instruction: Option<String>,
}

fn default_model_id() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_batch_size() -> u32 {
    32
}

fn default_max_tokens() -> u32 {
    256
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            driver: EmbeddingDriver::default(),
            model_id: default_model_id(),
            model_path: None,
            url: default_embedding_url(),
            timeout_secs: default_timeout(),
            batch_size: default_batch_size(),
            max_tokens: default_max_tokens(),
            dimension: default_dimension(),
            query_instruction: None,
        }
    }
}

impl EmbeddingConfig {
    /// Directory holding `model.onnx` and `tokenizer.json`.
    pub fn model_dir(&self) -> Option<PathBuf> {
        self.model_path.clone().or_else(|| {
            Config::models_dir().map(|dir| dir.join(self.model_id.replace('/', "--")))
        })
    }
}

/// Session retention. Both limits unset keeps every session for the
/// lifetime of the process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

impl SessionConfig {
    pub fn is_unbounded(&self) -> bool {
        self.max_sessions.is_none() && self.ttl_secs.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: u32,
}

fn default_top_k() -> u32 {
    DEFAULT_TOP_K
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_auto_start() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            staging_dir: None,
            max_upload_bytes: default_max_upload_bytes(),
            idle_timeout_secs: None,
            log_file: None,
            auto_start: default_auto_start(),
        }
    }
}

impl ServerConfig {
    /// Largest frame accepted on the socket: a base64 upload plus envelope.
    pub fn max_frame_bytes(&self) -> usize {
        (self.max_upload_bytes as usize / 3 + 1) * 4 + 64 * 1024
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_retention_days() -> u32 {
    DEFAULT_METRICS_RETENTION_DAYS
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            retention_days: default_retention_days(),
        }
    }
}

/// Chat completion settings. The API key is never stored in the file; it is
/// read from the environment variable named by `api_key_env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    #[serde(default = "default_answer_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_answer_model")]
    pub model: String,

    #[serde(default = "default_answer_api_key_env")]
    pub api_key_env: String,

    /// Language the answer is written in, e.g. "Arabic".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_language: Option<String>,

    /// What the model should say when the context does not hold the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_found_reply: Option<String>,

    #[serde(default = "default_answer_timeout")]
    pub timeout_secs: u64,
}

fn default_answer_endpoint() -> String {
    DEFAULT_ANSWER_ENDPOINT.to_string()
}

fn default_answer_model() -> String {
    DEFAULT_ANSWER_MODEL.to_string()
}

fn default_answer_api_key_env() -> String {
    DEFAULT_ANSWER_API_KEY_ENV.to_string()
}

fn default_answer_timeout() -> u64 {
    20
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_answer_endpoint(),
            model: default_answer_model(),
            api_key_env: default_answer_api_key_env(),
            reply_language: None,
            not_found_reply: None,
            timeout_secs: default_answer_timeout(),
        }
    }
}

impl AnswerConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}
