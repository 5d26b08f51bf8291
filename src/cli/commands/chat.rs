use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::load_config;
use crate::cli::output::{ChatReport, get_formatter};
use crate::client::DaemonClient;
use crate::models::{OutputFormat, QueryRequest};

#[derive(Debug, Args)]
pub struct ChatArgs {
    #[arg(required = true, help = "Session id returned by `ingest`")]
    pub session_id: String,

    #[arg(required = true, help = "Question to answer from the document")]
    pub question: String,

    #[arg(long, short = 'k', help = "Number of chunks given to the model as context")]
    pub top_k: Option<u32>,
}

pub async fn handle_chat(
    args: ChatArgs,
    config_path: Option<&Path>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let question = args.question.trim();
    if question.is_empty() {
        anyhow::bail!("question cannot be empty");
    }
    if args.top_k == Some(0) {
        anyhow::bail!("top_k must be at least 1");
    }

    let config = load_config(config_path)?;
    let formatter = get_formatter(format);
    let client = DaemonClient::new(&config).with_config_file(config_path.map(Path::to_path_buf));

    if verbose {
        eprintln!("Model: {}", config.answer.model);
        eprintln!("  Endpoint: {}", config.answer.endpoint);
    }

    let mut request = QueryRequest::new(&args.session_id, question);
    request.top_k = args.top_k;

    let spinner = (format == OutputFormat::Text).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Thinking...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let start = Instant::now();
    let result = client.chat(request).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let response = result.context("chat failed")?;

    let report = ChatReport {
        session_id: args.session_id,
        question: question.to_string(),
        answer: response.answer,
        top_chunks: response.top_chunks,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    print!("{}", formatter.format_chat(&report));

    Ok(())
}
