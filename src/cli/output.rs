use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{OutputFormat, QueryResponse};
use crate::services::MetricsSummary;

const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_ingest(&self, report: &IngestReport) -> String;
    fn format_query_results(&self, report: &QueryReport) -> String;
    fn format_chat(&self, report: &ChatReport) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document: String,
    pub session_id: String,
    pub num_chunks: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub session_id: String,
    pub question: String,
    #[serde(flatten)]
    pub response: QueryResponse,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReport {
    pub session_id: String,
    pub question: String,
    pub answer: String,
    pub top_chunks: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub daemon_running: bool,
    pub socket_path: String,
    pub embedding_model: Option<String>,
    pub answer_model: Option<String>,
    pub sessions: usize,
    pub chunks: usize,
    pub uptime_secs: Option<u64>,
    pub idle_secs: Option<u64>,
    pub requests_served: u64,
    pub metrics: Option<MetricsSummary>,
}

fn preview(content: &str) -> String {
    let head: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        format!("{}...", head)
    } else {
        head
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_ingest(&self, report: &IngestReport) -> String {
        let mut output = String::new();
        writeln!(output, "Ingested: {}", report.document).unwrap();
        writeln!(output, "Session:  {}", report.session_id).unwrap();
        writeln!(output, "Chunks:   {}", report.num_chunks).unwrap();
        writeln!(output, "Duration: {}ms", report.duration_ms).unwrap();
        output
    }

    fn format_query_results(&self, report: &QueryReport) -> String {
        if report.response.is_empty() {
            return format!("No results found for: {}\n", report.question);
        }

        let mut output = String::new();
        writeln!(output, "Results for: \"{}\"", report.question).unwrap();
        writeln!(
            output,
            "Found {} chunks in {}ms\n",
            report.response.len(),
            report.duration_ms
        )
        .unwrap();

        for (i, (chunk, score)) in report.response.iter().enumerate() {
            writeln!(output, "{}. [Score: {:.3}]", i + 1, score).unwrap();
            writeln!(output, "   ---").unwrap();
            for line in preview(chunk).lines() {
                writeln!(output, "   {}", line).unwrap();
            }
            writeln!(output).unwrap();
        }

        output
    }

    fn format_chat(&self, report: &ChatReport) -> String {
        let mut output = String::new();
        writeln!(output, "{}", report.answer.trim_end()).unwrap();
        writeln!(output).unwrap();
        writeln!(
            output,
            "({} context chunks, {}ms)",
            report.top_chunks.len(),
            report.duration_ms
        )
        .unwrap();
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let daemon_status = if status.daemon_running {
            "[RUNNING]"
        } else {
            "[STOPPED]"
        };
        writeln!(output, "Daemon:        {}", daemon_status).unwrap();
        writeln!(output, "  Socket:      {}", status.socket_path).unwrap();

        if status.daemon_running {
            if let Some(ref model) = status.embedding_model {
                writeln!(output, "  Embedding:   {}", model).unwrap();
            }
            if let Some(ref model) = status.answer_model {
                writeln!(output, "  Answers:     {}", model).unwrap();
            }
            writeln!(output, "  Sessions:    {}", status.sessions).unwrap();
            writeln!(output, "  Chunks:      {}", status.chunks).unwrap();
            if let Some(uptime) = status.uptime_secs {
                writeln!(output, "  Uptime:      {}s", uptime).unwrap();
            }
            if let Some(idle) = status.idle_secs {
                writeln!(output, "  Idle:        {}s", idle).unwrap();
            }
            writeln!(output, "  Served:      {}", status.requests_served).unwrap();
            if let Some(ref m) = status.metrics {
                writeln!(
                    output,
                    "  Requests:    {} ({} ingest, {} query, {} chat)",
                    m.total_requests, m.ingests, m.queries, m.chats
                )
                .unwrap();
                writeln!(output, "  Avg Latency: {}ms", m.avg_latency_ms).unwrap();
                if m.error_rate > 0.0 {
                    writeln!(output, "  Error Rate:  {:.1}%", m.error_rate).unwrap();
                }
            }
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, value: &impl Serialize) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

impl Formatter for JsonFormatter {
    fn format_ingest(&self, report: &IngestReport) -> String {
        self.render(report)
    }

    fn format_query_results(&self, report: &QueryReport) -> String {
        self.render(report)
    }

    fn format_chat(&self, report: &ChatReport) -> String {
        self.render(report)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let metrics = status.metrics.as_ref().map(|m| {
            serde_json::json!({
                "total_requests": m.total_requests,
                "ingests": m.ingests,
                "queries": m.queries,
                "chats": m.chats,
                "avg_latency_ms": m.avg_latency_ms,
                "error_rate": m.error_rate,
            })
        });

        let json = serde_json::json!({
            "daemon": {
                "running": status.daemon_running,
                "socket": status.socket_path,
                "embedding_model": status.embedding_model,
                "answer_model": status.answer_model,
                "uptime_secs": status.uptime_secs,
                "idle_secs": status.idle_secs,
                "requests_served": status.requests_served,
                "metrics": metrics,
            },
            "sessions": {
                "count": status.sessions,
                "chunks": status.chunks,
            }
        });

        self.render(&json)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_ingest(&self, report: &IngestReport) -> String {
        let mut output = String::new();
        writeln!(output, "## Document Ingested\n").unwrap();
        writeln!(output, "| Field | Value |").unwrap();
        writeln!(output, "|-------|-------|").unwrap();
        writeln!(output, "| Document | `{}` |", report.document).unwrap();
        writeln!(output, "| Session | `{}` |", report.session_id).unwrap();
        writeln!(output, "| Chunks | {} |", report.num_chunks).unwrap();
        writeln!(output, "| Duration | {}ms |", report.duration_ms).unwrap();
        output
    }

    fn format_query_results(&self, report: &QueryReport) -> String {
        if report.response.is_empty() {
            return format!("## No results found\n\nQuestion: `{}`\n", report.question);
        }

        let mut output = String::new();
        writeln!(output, "## Results\n").unwrap();
        writeln!(output, "**Question:** `{}`\n", report.question).unwrap();
        writeln!(output, "**Session:** `{}`\n", report.session_id).unwrap();

        for (i, (chunk, score)) in report.response.iter().enumerate() {
            writeln!(output, "### {}. Score: {:.3}\n", i + 1, score).unwrap();
            writeln!(output, "```").unwrap();
            writeln!(output, "{}", chunk).unwrap();
            writeln!(output, "```\n").unwrap();
        }

        output
    }

    fn format_chat(&self, report: &ChatReport) -> String {
        let mut output = String::new();
        writeln!(output, "## Answer\n").unwrap();
        writeln!(output, "**Question:** `{}`\n", report.question).unwrap();
        writeln!(output, "{}\n", report.answer.trim_end()).unwrap();
        writeln!(output, "### Context\n").unwrap();
        for (i, chunk) in report.top_chunks.iter().enumerate() {
            writeln!(output, "{}. {}", i + 1, preview(chunk).replace('\n', " ")).unwrap();
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();

        let daemon_status = if status.daemon_running { "✅" } else { "❌" };
        writeln!(output, "### Daemon {}\n", daemon_status).unwrap();
        writeln!(output, "- **Socket:** `{}`", status.socket_path).unwrap();

        if status.daemon_running {
            if let Some(ref model) = status.embedding_model {
                writeln!(output, "- **Embedding:** {}", model).unwrap();
            }
            writeln!(output, "- **Sessions:** {}", status.sessions).unwrap();
            writeln!(output, "- **Chunks:** {}", status.chunks).unwrap();
            if let Some(ref m) = status.metrics {
                writeln!(output, "- **Requests:** {}", m.total_requests).unwrap();
                writeln!(output, "- **Avg Latency:** {}ms", m.avg_latency_ms).unwrap();
                if m.error_rate > 0.0 {
                    writeln!(output, "- **Error Rate:** {:.1}%", m.error_rate).unwrap();
                }
            }
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
