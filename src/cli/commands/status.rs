use std::path::Path;

use anyhow::Result;

use crate::cli::load_config;
use crate::cli::output::{StatusInfo, get_formatter};
use crate::client::DaemonClient;
use crate::models::OutputFormat;

pub async fn handle_status(
    config_path: Option<&Path>,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let formatter = get_formatter(format);

    let client = DaemonClient::new(&config);
    let remote = if client.is_running() {
        client.status().await.ok()
    } else {
        None
    };

    let status = match remote {
        Some(s) => StatusInfo {
            daemon_running: s.running,
            socket_path: config.socket_path().display().to_string(),
            embedding_model: Some(s.embedding_model),
            answer_model: Some(s.answer_model).filter(|m| !m.is_empty()),
            sessions: s.sessions,
            chunks: s.chunks,
            uptime_secs: Some(s.uptime_secs),
            idle_secs: Some(s.idle_secs),
            requests_served: s.requests_served,
            metrics: s.metrics,
        },
        None => StatusInfo {
            daemon_running: false,
            socket_path: config.socket_path().display().to_string(),
            embedding_model: None,
            answer_model: None,
            sessions: 0,
            chunks: 0,
            uptime_secs: None,
            idle_secs: None,
            requests_served: 0,
            metrics: None,
        },
    };

    print!("{}", formatter.format_status(&status));

    if !status.daemon_running {
        eprintln!();
        eprintln!("Hint: daemon not running. It starts automatically on first ingest/query.");
        eprintln!("      Or start manually with: docrag serve");
    }

    Ok(())
}
