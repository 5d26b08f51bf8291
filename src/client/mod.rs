use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::error::DaemonError;
use crate::models::{ChatResponse, Config, IngestResponse, QueryRequest, QueryResponse};
use crate::server::protocol::{
    IngestRequest, Request, Response, StatusResponse, decode_length, encode_message,
};

pub struct DaemonClient {
    socket_path: PathBuf,
    log_path: PathBuf,
    auto_start: bool,
    max_upload_bytes: u64,
    config_file: Option<PathBuf>,
}

impl DaemonClient {
    pub fn new(config: &Config) -> Self {
        Self {
            socket_path: config.socket_path(),
            log_path: config.log_path(),
            auto_start: config.server.auto_start,
            max_upload_bytes: config.server.max_upload_bytes,
            config_file: None,
        }
    }

    /// Pass `--config <path>` to an auto-started daemon.
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_running(&self) -> bool {
        self.socket_path.exists()
            && std::os::unix::net::UnixStream::connect(&self.socket_path).is_ok()
    }

    pub async fn ensure_running(&self) -> Result<(), DaemonError> {
        if self.is_running() {
            return Ok(());
        }

        if !self.auto_start {
            return Err(DaemonError::NotRunning);
        }

        self.spawn_daemon()?;
        self.wait_for_ready().await
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Start `serve --daemon` in the background without waiting for it.
    /// Its log output is appended to [`Self::log_path`].
    pub fn spawn_daemon(&self) -> Result<(), DaemonError> {
        let exe = std::env::current_exe().map_err(|e| DaemonError::SpawnError(e.to_string()))?;
        let log = open_log(&self.log_path)?;

        let mut command = Command::new(&exe);
        command.args(["serve", "--daemon"]);
        if let Some(ref path) = self.config_file {
            command.arg("--config").arg(path);
        }

        command
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(log)
            .spawn()
            .map_err(|e| DaemonError::SpawnError(e.to_string()))?;

        Ok(())
    }

    async fn wait_for_ready(&self) -> Result<(), DaemonError> {
        let max_wait = Duration::from_secs(60);
        let check_interval = Duration::from_millis(100);
        let start = std::time::Instant::now();

        while start.elapsed() < max_wait {
            if self.is_running() && self.ping().await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(check_interval).await;
        }

        Err(DaemonError::Timeout)
    }

    async fn connect(&self) -> Result<UnixStream, DaemonError> {
        UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| DaemonError::ConnectionFailed(e.to_string()))
    }

    async fn send_request(&self, request: Request) -> Result<Response, DaemonError> {
        let mut stream = self.connect().await?;

        let encoded =
            encode_message(&request).map_err(|e| DaemonError::ProtocolError(e.to_string()))?;

        stream
            .write_all(&encoded)
            .await
            .map_err(|e| DaemonError::SocketError(e.to_string()))?;

        let mut len_buf = [0u8; 4];
        stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| DaemonError::SocketError(e.to_string()))?;

        let len = decode_length(&len_buf);
        let mut msg_buf = vec![0u8; len];

        stream
            .read_exact(&mut msg_buf)
            .await
            .map_err(|e| DaemonError::SocketError(e.to_string()))?;

        match serde_json::from_slice(&msg_buf)
            .map_err(|e| DaemonError::ProtocolError(e.to_string()))?
        {
            Response::Error(e) => Err(DaemonError::Remote {
                kind: e.kind,
                message: e.message,
            }),
            response => Ok(response),
        }
    }

    pub async fn ping(&self) -> Result<(), DaemonError> {
        match self.send_request(Request::Ping).await? {
            Response::Pong => Ok(()),
            _ => Err(unexpected()),
        }
    }

    pub async fn status(&self) -> Result<StatusResponse, DaemonError> {
        match self.send_request(Request::Status).await? {
            Response::Status(s) => Ok(s),
            _ => Err(unexpected()),
        }
    }

    pub async fn shutdown(&self) -> Result<(), DaemonError> {
        match self.send_request(Request::Shutdown).await? {
            Response::ShutdownAck => Ok(()),
            _ => Err(unexpected()),
        }
    }

    /// Upload a file from disk and return the new session.
    pub async fn ingest(&self, path: &Path) -> Result<IngestResponse, DaemonError> {
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() > self.max_upload_bytes {
            return Err(DaemonError::ProtocolError(format!(
                "{} is {} bytes, limit is {}",
                path.display(),
                metadata.len(),
                self.max_upload_bytes
            )));
        }
        let content = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());

        self.ensure_running().await?;

        let request = Request::Ingest(IngestRequest {
            filename,
            content_base64: BASE64.encode(content),
        });

        match self.send_request(request).await? {
            Response::Ingest(r) => Ok(r),
            _ => Err(unexpected()),
        }
    }

    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse, DaemonError> {
        self.ensure_running().await?;

        match self.send_request(Request::Query(request)).await? {
            Response::Query(r) => Ok(r),
            _ => Err(unexpected()),
        }
    }

    /// Ask for a generated answer grounded on the session's top chunks.
    pub async fn chat(&self, request: QueryRequest) -> Result<ChatResponse, DaemonError> {
        self.ensure_running().await?;

        match self.send_request(Request::Chat(request)).await? {
            Response::Chat(r) => Ok(r),
            _ => Err(unexpected()),
        }
    }
}

fn open_log(path: &Path) -> Result<std::fs::File, DaemonError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?)
}

fn unexpected() -> DaemonError {
    DaemonError::ProtocolError("unexpected response".to_string())
}

pub fn stop_daemon(config: &Config) -> Result<(), DaemonError> {
    let pid_path = config.pid_path();
    if !pid_path.exists() {
        return Err(DaemonError::NotRunning);
    }

    let pid_str = std::fs::read_to_string(&pid_path)?;
    let pid: i32 = pid_str
        .trim()
        .parse()
        .map_err(|_| DaemonError::ProtocolError("invalid pid file".to_string()))?;

    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid), Signal::SIGTERM)
            .map_err(|e| DaemonError::SocketError(e.to_string()))?;
    }

    let _ = std::fs::remove_file(&pid_path);
    let _ = std::fs::remove_file(config.socket_path());

    Ok(())
}
