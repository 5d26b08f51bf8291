use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::load_config;
use crate::cli::output::{IngestReport, get_formatter};
use crate::client::DaemonClient;
use crate::models::OutputFormat;

#[derive(Debug, Args)]
pub struct IngestArgs {
    #[arg(required = true, help = "PDF or text file to ingest")]
    pub path: PathBuf,
}

pub async fn handle_ingest(
    args: IngestArgs,
    config_path: Option<&Path>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    if !args.path.is_file() {
        anyhow::bail!("not a file: {}", args.path.display());
    }

    let config = load_config(config_path)?;
    let formatter = get_formatter(format);
    let client = DaemonClient::new(&config).with_config_file(config_path.map(Path::to_path_buf));

    if verbose {
        eprintln!("Ingesting: {}", args.path.display());
        eprintln!("  Chunking: size={} overlap={}", config.chunking.size, config.chunking.overlap);
        eprintln!("  Socket: {}", client.socket_path().display());
    }

    let spinner = (format == OutputFormat::Text).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Ingesting {}", args.path.display()));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let start = Instant::now();
    let result = client.ingest(&args.path).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let response = result.with_context(|| format!("failed to ingest {}", args.path.display()))?;

    let report = IngestReport {
        document: args.path.display().to_string(),
        session_id: response.session_id,
        num_chunks: response.num_chunks,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    print!("{}", formatter.format_ingest(&report));

    Ok(())
}
