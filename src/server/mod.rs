pub mod protocol;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Notify, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, DaemonError, ErrorKind, IngestError};
use crate::models::{Config, EmbeddingDriver, ErrorResponse};
use crate::server::protocol::{
    IngestRequest, Request, Response, StatusResponse, decode_length, encode_message,
};
use crate::services::{
    AnswerService, DocumentSource, Embedder, EmbeddingProvider, FileExtractor, HttpEmbeddingClient,
    IngestPipeline, MetricsStore, Operation, QueryService, SessionStore, TextChunker,
    create_provider,
};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10);

/// Everything a connection task needs, shared behind one `Arc`.
struct ServerState {
    config: Config,
    embedding_model: String,
    store: Arc<SessionStore>,
    pipeline: IngestPipeline,
    query: Arc<QueryService>,
    answer: AnswerService,
    metrics: Option<MetricsStore>,
    started: Instant,
    last_request: RwLock<Instant>,
    requests_served: AtomicU64,
    shutdown: Notify,
}

pub struct DaemonServer {
    socket_path: PathBuf,
    state: Arc<ServerState>,
}

impl DaemonServer {
    /// Load the configured embedding provider and wire up the services.
    pub async fn new(config: Config) -> Result<Self, AppError> {
        if matches!(config.embedding.driver, EmbeddingDriver::Http) {
            let client = HttpEmbeddingClient::new(&config.embedding)?;
            match client.health_check().await {
                Ok(health) => info!(
                    url = client.base_url(),
                    status = ?health.status,
                    "embedding server reachable"
                ),
                Err(e) => warn!(url = client.base_url(), error = %e, "embedding server health check failed"),
            }
        }

        let embedding = config.embedding.clone();
        let provider = tokio::task::spawn_blocking(move || create_provider(&embedding))
            .await
            .map_err(|e| AppError::Other(format!("provider load task failed: {e}")))??;
        info!(model = provider.model_id(), "embedding provider ready");

        Self::with_provider(config, provider)
    }

    pub fn with_provider(
        config: Config,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, AppError> {
        let chunker = TextChunker::new(&config.chunking)?;
        let embedding_model = provider.model_id().to_string();
        let embedder = Embedder::new(provider);
        let store = Arc::new(SessionStore::new(&config.sessions));

        let pipeline = IngestPipeline::new(
            Arc::new(FileExtractor),
            chunker,
            embedder.clone(),
            Arc::clone(&store),
            config.staging_dir(),
        )
        .with_max_upload_bytes(config.server.max_upload_bytes);
        let query = Arc::new(
            QueryService::new(Arc::clone(&store), embedder)
                .with_default_top_k(config.query.default_top_k),
        );
        let answer = AnswerService::new(Arc::clone(&query), &config.answer)?;
        if config.answer.api_key().is_none() {
            warn!(
                env = %config.answer.api_key_env,
                "no completion API key set, chat requests are sent unauthenticated"
            );
        }

        let metrics = open_metrics(&config);

        Ok(Self {
            socket_path: config.socket_path(),
            state: Arc::new(ServerState {
                config,
                embedding_model,
                store,
                pipeline,
                query,
                answer,
                metrics,
                started: Instant::now(),
                last_request: RwLock::new(Instant::now()),
                requests_served: AtomicU64::new(0),
                shutdown: Notify::new(),
            }),
        })
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    pub async fn run(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        self.write_pid_file()?;

        let idle_timeout = self
            .state
            .config
            .server
            .idle_timeout_secs
            .map(Duration::from_secs);
        info!(
            socket = %self.socket_path.display(),
            idle_timeout_secs = ?idle_timeout.map(|d| d.as_secs()),
            "daemon listening"
        );

        let mut maintenance = tokio::time::interval(MAINTENANCE_INTERVAL);
        maintenance.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let signal = shutdown_signal();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let state = Arc::clone(&self.state);
                            tokio::spawn(async move {
                                handle_connection(state, stream).await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "accept failed");
                        }
                    }
                }
                _ = maintenance.tick() => {
                    self.state.store.sweep_expired().await;
                    if let Some(timeout) = idle_timeout {
                        let last = *self.state.last_request.read().await;
                        if last.elapsed() > timeout {
                            info!("idle timeout reached, shutting down");
                            break;
                        }
                    }
                }
                _ = self.state.shutdown.notified() => {
                    info!("shutdown requested");
                    break;
                }
                _ = &mut signal => {
                    info!("received termination signal, shutting down");
                    break;
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    fn write_pid_file(&self) -> Result<(), std::io::Error> {
        std::fs::write(self.state.config.pid_path(), std::process::id().to_string())
    }

    fn cleanup(&self) {
        let _ = std::fs::remove_file(&self.socket_path);
        let _ = std::fs::remove_file(self.state.config.pid_path());
        info!("daemon stopped");
    }
}

fn open_metrics(config: &Config) -> Option<MetricsStore> {
    if !config.metrics.enabled {
        return None;
    }
    let path = Config::metrics_db_path()?;
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match MetricsStore::open(&path) {
        Ok(store) => {
            store.cleanup(config.metrics.retention_days);
            info!(
                retention_days = config.metrics.retention_days,
                "metrics enabled"
            );
            Some(store)
        }
        Err(e) => {
            warn!(error = %e, "failed to open metrics database");
            None
        }
    }
}

async fn handle_connection(state: Arc<ServerState>, mut stream: UnixStream) {
    let max_frame = state.config.server.max_frame_bytes();
    let mut len_buf = [0u8; 4];

    while stream.read_exact(&mut len_buf).await.is_ok() {
        let len = decode_length(&len_buf);
        if len > max_frame {
            warn!(len, max_frame, "frame too large, closing connection");
            let response = Response::error(
                ErrorKind::InvalidRequest,
                format!("message of {len} bytes exceeds limit of {max_frame}"),
            );
            let _ = write_response(&mut stream, &response).await;
            break;
        }

        let mut msg_buf = vec![0u8; len];
        if stream.read_exact(&mut msg_buf).await.is_err() {
            break;
        }

        *state.last_request.write().await = Instant::now();

        let request: Request = match serde_json::from_slice(&msg_buf) {
            Ok(r) => r,
            Err(e) => {
                let response =
                    Response::error(ErrorKind::InvalidRequest, format!("invalid request: {e}"));
                if write_response(&mut stream, &response).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let response = handle_request(&state, request).await;
        state.requests_served.fetch_add(1, Ordering::Relaxed);

        if write_response(&mut stream, &response).await.is_err() {
            break;
        }

        if matches!(response, Response::ShutdownAck) {
            break;
        }
    }
}

async fn write_response(stream: &mut UnixStream, response: &Response) -> Result<(), DaemonError> {
    let encoded =
        encode_message(response).map_err(|e| DaemonError::ProtocolError(e.to_string()))?;
    stream.write_all(&encoded).await?;
    Ok(())
}

async fn handle_request(state: &ServerState, request: Request) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Shutdown => {
            state.shutdown.notify_one();
            Response::ShutdownAck
        }

        Request::Status => {
            let last = *state.last_request.read().await;
            let stats = state.store.stats().await;
            let metrics = state
                .metrics
                .as_ref()
                .map(|m| m.get_summary(state.config.metrics.retention_days));
            Response::Status(StatusResponse {
                running: true,
                embedding_model: state.embedding_model.clone(),
                answer_model: state.answer.model().to_string(),
                sessions: stats.sessions,
                chunks: stats.chunks,
                uptime_secs: state.started.elapsed().as_secs(),
                idle_secs: last.elapsed().as_secs(),
                requests_served: state.requests_served.load(Ordering::Relaxed),
                metrics,
            })
        }

        Request::Ingest(req) => {
            let start = Instant::now();
            let result = ingest(state, req).await;
            state.record(Operation::Ingest, start, result.is_ok());
            match result {
                Ok(r) => Response::Ingest(r),
                Err(e) => {
                    warn!(kind = %e.kind(), error = %e, "ingest failed");
                    Response::Error(ErrorResponse::from(&e))
                }
            }
        }

        Request::Query(req) => {
            let start = Instant::now();
            let result = state.query.query(&req).await;
            state.record(Operation::Query, start, result.is_ok());
            match result {
                Ok(r) => Response::Query(r),
                Err(e) => {
                    debug!(kind = %e.kind(), error = %e, "query failed");
                    Response::Error(ErrorResponse::from(&e))
                }
            }
        }

        Request::Chat(req) => {
            let start = Instant::now();
            let result = state.answer.chat(&req).await;
            state.record(Operation::Chat, start, result.is_ok());
            match result {
                Ok(r) => Response::Chat(r),
                Err(e) => {
                    warn!(kind = %e.kind(), error = %e, "chat failed");
                    Response::Error(ErrorResponse::from(&e))
                }
            }
        }
    }
}

async fn ingest(
    state: &ServerState,
    req: IngestRequest,
) -> Result<crate::models::IngestResponse, IngestError> {
    let content = BASE64
        .decode(req.content_base64.as_bytes())
        .map_err(|e| IngestError::InvalidUpload(e.to_string()))?;
    state
        .pipeline
        .ingest(DocumentSource {
            content,
            filename: req.filename,
        })
        .await
}

impl ServerState {
    fn record(&self, operation: Operation, start: Instant, success: bool) {
        if let Some(ref metrics) = self.metrics {
            metrics.record(operation, start.elapsed().as_millis() as u64, success);
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

pub async fn run_daemon(config: Config) -> Result<(), AppError> {
    let server = DaemonServer::new(config).await?;
    server.run().await.map_err(DaemonError::Io)?;
    Ok(())
}
