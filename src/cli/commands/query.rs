use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::load_config;
use crate::cli::output::{QueryReport, get_formatter};
use crate::client::DaemonClient;
use crate::models::{OutputFormat, QueryRequest};

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[arg(required = true, help = "Session id returned by `ingest`")]
    pub session_id: String,

    #[arg(required = true, help = "Question to ask")]
    pub question: String,

    #[arg(long, short = 'k', help = "Number of chunks to return")]
    pub top_k: Option<u32>,
}

pub async fn handle_query(
    args: QueryArgs,
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
        eprintln!("Question: \"{question}\"");
        eprintln!("  Session: {}", args.session_id);
        eprintln!(
            "  Top k: {}",
            args.top_k.unwrap_or(config.query.default_top_k)
        );
    }

    let mut request = QueryRequest::new(&args.session_id, question);
    request.top_k = args.top_k;

    let start = Instant::now();
    let response = client.query(request).await.context("query failed")?;
    let duration_ms = start.elapsed().as_millis() as u64;

    if verbose {
        eprintln!("Timing: {duration_ms}ms");
        eprintln!();
    }

    let report = QueryReport {
        session_id: args.session_id,
        question: question.to_string(),
        response,
        duration_ms,
    };
    print!("{}", formatter.format_query_results(&report));

    Ok(())
}
