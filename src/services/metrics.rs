use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::warn;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS request_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    operation TEXT NOT NULL,
    latency_ms INTEGER NOT NULL,
    success INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_request_log_timestamp ON request_log(timestamp);
CREATE INDEX IF NOT EXISTS idx_request_log_operation ON request_log(operation);
"#;

/// Which daemon operation a log row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Ingest,
    Query,
    Chat,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Ingest => "ingest",
            Operation::Query => "query",
            Operation::Chat => "chat",
        }
    }
}

/// SQLite request log. The connection is serialized behind a mutex so the
/// store can be shared across connection tasks.
pub struct MetricsStore {
    conn: Mutex<Connection>,
}

impl MetricsStore {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "auto_vacuum", "INCREMENTAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn record(&self, operation: Operation, latency_ms: u64, success: bool) {
        let Ok(conn) = self.conn.lock() else {
            return;
        };
        if let Err(e) = conn.execute(
            "INSERT INTO request_log (timestamp, operation, latency_ms, success)
             VALUES (datetime('now'), ?1, ?2, ?3)",
            params![operation.as_str(), latency_ms as i64, success as i32],
        ) {
            warn!(error = %e, "failed to record metrics");
        }
    }

    pub fn get_summary(&self, retention_days: u32) -> MetricsSummary {
        let Ok(conn) = self.conn.lock() else {
            return MetricsSummary::default();
        };

        let window = format!("-{} days", retention_days);
        let totals = conn.query_row(
            r#"
            SELECT
                COUNT(*) as total_requests,
                COALESCE(AVG(latency_ms), 0) as avg_latency_ms,
                COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END) * 100.0 / NULLIF(COUNT(*), 0), 0) as error_rate,
                COALESCE(SUM(CASE WHEN operation = 'ingest' THEN 1 ELSE 0 END), 0) as ingests,
                COALESCE(SUM(CASE WHEN operation = 'query' THEN 1 ELSE 0 END), 0) as queries,
                COALESCE(SUM(CASE WHEN operation = 'chat' THEN 1 ELSE 0 END), 0) as chats
            FROM request_log
            WHERE timestamp >= datetime('now', ?1)
            "#,
            params![window],
            |row| {
                Ok(MetricsSummary {
                    total_requests: row.get::<_, i64>(0)? as u64,
                    avg_latency_ms: row.get::<_, f64>(1)? as u64,
                    error_rate: row.get::<_, f64>(2)? as f32,
                    ingests: row.get::<_, i64>(3)? as u64,
                    queries: row.get::<_, i64>(4)? as u64,
                    chats: row.get::<_, i64>(5)? as u64,
                })
            },
        );

        totals.unwrap_or_else(|e| {
            warn!(error = %e, "failed to read metrics summary");
            MetricsSummary::default()
        })
    }

    pub fn cleanup(&self, retention_days: u32) {
        let Ok(conn) = self.conn.lock() else {
            return;
        };
        let window = format!("-{} days", retention_days);
        let _ = conn.execute(
            "DELETE FROM request_log WHERE timestamp < datetime('now', ?1)",
            params![window],
        );
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub avg_latency_ms: u64,
    pub error_rate: f32,
    #[serde(default)]
    pub ingests: u64,
    #[serde(default)]
    pub queries: u64,
    #[serde(default)]
    pub chats: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_operations() {
        let store = MetricsStore::open_in_memory().unwrap();
        store.record(Operation::Ingest, 120, true);
        store.record(Operation::Query, 10, true);
        store.record(Operation::Query, 30, false);
        store.record(Operation::Chat, 900, true);

        let summary = store.get_summary(7);
        assert_eq!(summary.total_requests, 4);
        assert_eq!(summary.ingests, 1);
        assert_eq!(summary.queries, 2);
        assert_eq!(summary.chats, 1);
        assert!((summary.error_rate - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_summary() {
        let store = MetricsStore::open_in_memory().unwrap();
        let summary = store.get_summary(7);
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.error_rate, 0.0);
    }

    #[test]
    fn test_cleanup_keeps_recent_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetricsStore::open(&dir.path().join("metrics.db")).unwrap();
        store.record(Operation::Ingest, 5, true);
        store.cleanup(7);
        assert_eq!(store.get_summary(7).total_requests, 1);
    }
}
